//! Spacing between CJK and half-width text.
//!
//! Inserts one space wherever a CJK character touches a latin letter,
//! digit, or common symbol. Fenced code blocks are left untouched.

use std::sync::LazyLock;

use regex::Regex;

const CJK: &str = r"\p{Han}\p{Hiragana}\p{Katakana}\p{Bopomofo}";

static CJK_THEN_ANS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"([{CJK}])([A-Za-z0-9@#$%^&*+=|/\\\-])")).ok());

static ANS_THEN_CJK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"([A-Za-z0-9!%&*+=|/\\\-])([{CJK}])")).ok());

pub fn spacing(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut in_fence = false;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line);
        } else if in_fence {
            out.push_str(line);
        } else {
            out.push_str(&space_line(line));
        }
    }
    out
}

fn space_line(line: &str) -> String {
    let (Some(forward), Some(backward)) = (CJK_THEN_ANS.as_ref(), ANS_THEN_CJK.as_ref()) else {
        return line.to_string();
    };
    let spaced = forward.replace_all(line, "$1 $2");
    backward.replace_all(&spaced, "$1 $2").into_owned()
}
