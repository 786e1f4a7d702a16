//! Async evaluator over a fixed scope.
//!
//! Names resolve only against the scope map handed in by the caller.
//! There is no global object and no way to create bindings, so a
//! script can reach exactly what the scope contains.

use std::collections::BTreeMap;

use futures::future::{BoxFuture, FutureExt};

use super::parser::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use super::value::{Capability, Value};
use super::{SandboxError, ToolHost, pangu};
use crate::model::ImageBlob;

pub struct Evaluator<'a> {
    scope: &'a BTreeMap<String, Value>,
    host: &'a dyn ToolHost,
}

impl<'a> Evaluator<'a> {
    pub fn new(scope: &'a BTreeMap<String, Value>, host: &'a dyn ToolHost) -> Self {
        Self { scope, host }
    }

    pub fn eval<'e>(&'e self, expr: &'e Expr) -> BoxFuture<'e, Result<Value, SandboxError>> {
        async move {
            match expr {
                Expr::Literal(literal) => Ok(match literal {
                    Literal::Null => Value::Null,
                    Literal::Bool(b) => Value::Bool(*b),
                    Literal::Number(n) => Value::Number(*n),
                    Literal::Str(s) => Value::String(s.clone()),
                }),
                Expr::Ident(name) => self
                    .scope
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SandboxError::UnknownIdentifier(name.clone())),
                Expr::Array(items) => Ok(Value::List(self.eval_all(items).await?)),
                Expr::Object(fields) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in fields {
                        map.insert(key.clone(), self.eval(value).await?);
                    }
                    Ok(Value::Map(map))
                }
                Expr::Member {
                    object,
                    property,
                    optional,
                } => {
                    let target = self.eval(object).await?;
                    if *optional && matches!(target, Value::Null) {
                        return Ok(Value::Null);
                    }
                    property_of(&target, property)
                }
                Expr::Index { object, index } => {
                    let target = self.eval(object).await?;
                    let index = self.eval(index).await?;
                    index_of(&target, &index)
                }
                Expr::Call { callee, args } => self.call(callee, args).await,
                Expr::Unary { op, operand } => {
                    let v = self.eval(operand).await?;
                    Ok(match op {
                        UnaryOp::Not => Value::Bool(!v.truthy()),
                        UnaryOp::Neg => Value::Number(-v.to_number()),
                        UnaryOp::Plus => Value::Number(v.to_number()),
                    })
                }
                Expr::Binary { op, left, right } => {
                    let l = self.eval(left).await?;
                    let r = self.eval(right).await?;
                    Ok(binary(*op, &l, &r))
                }
                Expr::Logical { op, left, right } => {
                    let l = self.eval(left).await?;
                    let take_right = match op {
                        LogicalOp::And => l.truthy(),
                        LogicalOp::Or => !l.truthy(),
                        LogicalOp::Nullish => matches!(l, Value::Null),
                    };
                    if take_right {
                        self.eval(right).await
                    } else {
                        Ok(l)
                    }
                }
                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                } => {
                    if self.eval(test).await?.truthy() {
                        self.eval(consequent).await
                    } else {
                        self.eval(alternate).await
                    }
                }
            }
        }
        .boxed()
    }

    async fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, SandboxError> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.eval(expr).await?);
        }
        Ok(out)
    }

    async fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Value, SandboxError> {
        if let Expr::Member {
            object,
            property,
            optional,
        } = callee
        {
            let receiver = self.eval(object).await?;
            if *optional && matches!(receiver, Value::Null) {
                return Ok(Value::Null);
            }
            let args = self.eval_all(args).await?;
            let method = match &receiver {
                Value::String(s) => string_method(s, property, &args),
                Value::List(items) => list_method(items, property, &args),
                Value::Map(map) => match map.get(property) {
                    Some(Value::Function(cap)) => return self.invoke(*cap, args).await,
                    _ => None,
                },
                Value::Null => return Err(null_access(property)),
                _ => None,
            };
            return method.unwrap_or_else(|| {
                Err(SandboxError::Type(format!(
                    "{} is not a function",
                    path_of(callee)
                )))
            });
        }

        let function = self.eval(callee).await?;
        let args = self.eval_all(args).await?;
        match function {
            Value::Function(cap) => self.invoke(cap, args).await,
            _ => Err(SandboxError::Type(format!(
                "{} is not a function",
                path_of(callee)
            ))),
        }
    }

    async fn invoke(&self, cap: Capability, args: Vec<Value>) -> Result<Value, SandboxError> {
        tracing::debug!(capability = cap.name(), args = args.len(), "capability call");
        match cap {
            Capability::Notify => {
                let message = args.first().map(Value::display).unwrap_or_default();
                self.host.notify(&message);
                Ok(Value::Null)
            }
            Capability::LoadImage => {
                let url = string_arg(cap, &args, 0)?;
                Ok(Value::Image(self.host.load_image(&url).await?))
            }
            Capability::CaptureVisibleTab => {
                Ok(Value::Image(self.host.capture_visible_tab().await?))
            }
            Capability::CopyToClipboard => {
                let text = args.first().map(Value::display).unwrap_or_default();
                self.host.copy_to_clipboard(&text).await?;
                Ok(Value::Null)
            }
            Capability::CreateAndDownloadFile => {
                let file_name = string_arg(cap, &args, 0)?;
                let content = match args.get(1) {
                    Some(Value::Image(image)) => image.data.to_vec(),
                    Some(other) => other.display().into_bytes(),
                    None => Vec::new(),
                };
                self.host.download(&file_name, &content).await?;
                Ok(Value::Null)
            }
            Capability::Pangu => {
                let text = string_arg(cap, &args, 0)?;
                Ok(Value::String(pangu::spacing(&text)))
            }
            Capability::Ocr => {
                let image = image_arg(cap, &args, 0)?;
                Ok(Value::String(self.host.ocr(&image).await?))
            }
            Capability::UploadImage => {
                let image = image_arg(cap, &args, 0)?;
                Ok(Value::String(self.host.upload_image(&image).await?))
            }
        }
    }
}

// -- Value operations --

fn property_of(target: &Value, property: &str) -> Result<Value, SandboxError> {
    Ok(match (target, property) {
        (Value::Null, _) => return Err(null_access(property)),
        (Value::String(s), "length") => Value::Number(s.chars().count() as f64),
        (Value::List(items), "length") => Value::Number(items.len() as f64),
        (Value::Map(map), key) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Image(image), "mimeType") => Value::String(image.mime_type.clone()),
        (Value::Image(image), "size") => Value::Number(image.data.len() as f64),
        _ => Value::Null,
    })
}

fn index_of(target: &Value, index: &Value) -> Result<Value, SandboxError> {
    let position = |n: f64| (n >= 0.0 && n.fract() == 0.0).then_some(n as usize);
    Ok(match (target, index) {
        (Value::Null, _) => return Err(null_access(&index.display())),
        (Value::List(items), Value::Number(n)) => position(*n)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        (Value::String(s), Value::Number(n)) => position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        (Value::Map(_), key) | (Value::String(_), key @ Value::String(_)) => {
            property_of(target, &key.display())?
        }
        _ => Value::Null,
    })
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => match (l, r) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", l.display(), r.display()))
            }
            _ => Value::Number(l.to_number() + r.to_number()),
        },
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Eq => Value::Bool(l == r),
        BinaryOp::NotEq => Value::Bool(l != r),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            Value::Bool(ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Gt => o.is_gt(),
                BinaryOp::Le => o.is_le(),
                _ => o.is_ge(),
            }))
        }
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, SandboxError>> {
    let text = |i: usize| args.get(i).map(Value::display).unwrap_or_default();
    Some(Ok(match name {
        "trim" => Value::String(s.trim().to_string()),
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "includes" => Value::Bool(s.contains(&text(0))),
        "replace" => Value::String(s.replacen(&text(0), &text(1), 1)),
        _ => return None,
    }))
}

fn list_method(items: &[Value], name: &str, args: &[Value]) -> Option<Result<Value, SandboxError>> {
    match name {
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(v) => v.display(),
            };
            let joined = items
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    other => other.display(),
                })
                .collect::<Vec<_>>()
                .join(&separator);
            Some(Ok(Value::String(joined)))
        }
        _ => None,
    }
}

fn string_arg(cap: Capability, args: &[Value], i: usize) -> Result<String, SandboxError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(bad_argument(cap, i, "a string", other)),
    }
}

fn image_arg(cap: Capability, args: &[Value], i: usize) -> Result<ImageBlob, SandboxError> {
    match args.get(i) {
        Some(Value::Image(image)) => Ok(image.clone()),
        other => Err(bad_argument(cap, i, "an image", other)),
    }
}

fn bad_argument(cap: Capability, i: usize, expected: &str, got: Option<&Value>) -> SandboxError {
    SandboxError::Type(format!(
        "{}: argument {} must be {expected}, got {}",
        cap.name(),
        i + 1,
        got.map_or("nothing", Value::type_name)
    ))
}

fn null_access(property: &str) -> SandboxError {
    SandboxError::Type(format!(
        "cannot read properties of null (reading '{property}')"
    ))
}

/// Dotted name of a callee for error messages.
fn path_of(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", path_of(object)),
        Expr::Call { callee, .. } => format!("{}(...)", path_of(callee)),
        _ => "expression".to_string(),
    }
}
