//! Effect handlers - one per triplet, each answering its `Started`.
//!
//! Every handler follows the same shape: read what it needs with
//! `select`, await external work through `call`, and hand the outcome
//! to `settle`, which puts `Done` or `Failed`. Errors returned from a
//! handler become error notifications at the runtime boundary.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::effects::{EffectError, Effects, Notification};
use crate::model::{Account, ImageBlob, ImageHosting};
use crate::platform::{PlatformError, PlatformSet, TabCommand, remote};
use crate::registry::ImageHostingService;
use crate::sandbox::{Capability, SandboxError, ToolHost, ToolRunner};
use crate::verify::{filter_compatible, verify_account};

use super::action::{
    AccountForm, Action, DeletedImageHosting, EditAccount, EditImageHosting, IconfontConfig,
    ImageHostingForm, PowerpackSession, RunExtension, ServicesMeta,
};
use super::{Deps, PreferenceModel};

type Fx = Effects<PreferenceModel>;

// -- Preference flags --

pub async fn set_show_line_number(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let value = !fx.select(|s| s.user_preference.show_line_number);
    let outcome = fx
        .try_call(deps.repo.set_show_line_number(value))
        .await
        .map(|()| value);
    fx.settle((), outcome, Action::SetShowLineNumber)
}

pub async fn set_editor_live_rendering(
    _: (),
    fx: Fx,
    deps: Arc<Deps>,
) -> Result<(), EffectError> {
    let value = !fx.select(|s| s.user_preference.live_rendering);
    let outcome = fx
        .try_call(deps.repo.set_live_rendering(value))
        .await
        .map(|()| value);
    fx.settle((), outcome, Action::SetEditorLiveRendering)
}

// -- Locale --

pub async fn set_locale_to_storage(
    locale: String,
    fx: Fx,
    deps: Arc<Deps>,
) -> Result<(), EffectError> {
    let outcome = fx.try_call(deps.repo.set_locale(&locale)).await;
    fx.settle(locale, outcome, Action::SetLocaleToStorage)
}

/// Localized metadata of every registered provider.
pub fn services_meta(deps: &Deps, locale: &str) -> ServicesMeta {
    ServicesMeta {
        services_meta: deps.registry.services_meta(deps.catalog.as_ref(), locale),
        image_hosting_services_meta: deps
            .registry
            .image_hosting_services_meta(deps.catalog.as_ref(), locale),
    }
}

// -- Powerpack --

pub async fn init_powerpack(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = async {
        let access_token = fx.try_call(deps.repo.access_token()).await?;
        let user_info = match &access_token {
            None => None,
            Some(token) => match fx.try_call(deps.platform.powerpack.user_info(token)).await {
                Ok(info) => Some(info),
                Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
                Err(e) => {
                    tracing::warn!(error = %e, "powerpack user info unavailable");
                    None
                }
            },
        };
        Ok::<_, EffectError>(PowerpackSession {
            access_token,
            user_info,
        })
    }
    .await;
    fx.settle((), outcome, Action::InitPowerpack)
}

pub async fn login_with_token(token: String, fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx.try_call(deps.repo.set_access_token(&token)).await;
    if outcome.is_ok() {
        match fx.try_call(deps.platform.tab.close_current_tab()).await {
            Ok(()) | Err(EffectError::Cancelled) => {}
            Err(e) => tracing::warn!(error = %e, "login tab not closed"),
        }
    }
    fx.settle(token, outcome, Action::LoginWithToken)
}

// -- Remote config --

/// Resolve the iconfont location and its icons. Always completes.
pub async fn fetch_remote_config(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let config = &deps.config;
    let source = &deps.platform.remote_config;

    let remote = if config.fetch_remote_config {
        match fx.try_call(source.fetch_config()).await {
            Ok(remote) => Some(remote),
            Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "remote config unavailable, using bundled iconfont");
                let bundled = IconfontConfig {
                    iconfont_url: config.bundled_iconfont_url.clone(),
                    iconfont_icons: config.bundled_icons.clone(),
                };
                return fx.settle((), Ok(bundled), Action::FetchRemoteConfig);
            }
        }
    } else {
        None
    };

    let (iconfont_url, listed) = match remote {
        Some(remote) => (remote.iconfont, remote.icons),
        None => (config.bundled_iconfont_url.clone(), Vec::new()),
    };
    let iconfont_icons = if listed.is_empty() {
        match fx.try_call(source.fetch_iconfont(&iconfont_url)).await {
            Ok(script) => remote::parse_icons(&script),
            Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
            Err(e) => {
                tracing::warn!(url = %iconfont_url, error = %e, "iconfont scan failed");
                Vec::new()
            }
        }
    } else {
        listed
    };
    tracing::debug!(url = %iconfont_url, icons = iconfont_icons.len(), "iconfont resolved");
    fx.settle(
        (),
        Ok(IconfontConfig {
            iconfont_url,
            iconfont_icons,
        }),
        Action::FetchRemoteConfig,
    )
}

// -- Image hosting --

/// Build the host through its provider factory so the id is the
/// provider's stable id for this config.
fn image_hosting_from_form(
    deps: &Deps,
    form: &ImageHostingForm,
) -> Result<ImageHosting, EffectError> {
    let service = deps
        .registry
        .image_hosting_service_factory(&form.kind, &form.info)
        .ok_or_else(|| EffectError::Unsupported(form.kind.clone()))?;
    Ok(ImageHosting {
        id: service.id(),
        kind: form.kind.clone(),
        info: form.info.clone(),
        remark: form.remark.clone(),
    })
}

pub async fn add_image_hosting(
    form: ImageHostingForm,
    fx: Fx,
    deps: Arc<Deps>,
) -> Result<(), EffectError> {
    let outcome = match image_hosting_from_form(&deps, &form) {
        Ok(hosting) => fx.try_call(deps.repo.add_image_hosting(hosting)).await,
        Err(e) => Err(e),
    };
    fx.settle(form, outcome, Action::AddImageHosting)
}

pub async fn edit_image_hosting(
    params: EditImageHosting,
    fx: Fx,
    deps: Arc<Deps>,
) -> Result<(), EffectError> {
    let outcome = match image_hosting_from_form(&deps, &params.form) {
        Ok(hosting) => {
            fx.try_call(deps.repo.edit_image_hosting_by_id(&params.id, hosting))
                .await
        }
        Err(e) => Err(e),
    };
    fx.settle(params, outcome, Action::EditImageHosting)
}

pub async fn delete_image_hosting(id: String, fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx
        .try_call(deps.repo.delete_image_hosting_by_id(&id))
        .await
        .map(|(image_hosting, accounts)| DeletedImageHosting {
            image_hosting,
            accounts,
        });
    fx.settle(id, outcome, Action::DeleteImageHosting)
}

// -- Tool --

pub async fn hide_tool(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx
        .try_call(deps.platform.tab.send(TabCommand::HideTool))
        .await
        .map(drop);
    fx.settle((), outcome, Action::HideTool)
}

pub async fn remove_tool(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx
        .try_call(deps.platform.tab.send(TabCommand::RemoveTool))
        .await
        .map(drop);
    fx.settle((), outcome, Action::RemoveTool)
}

pub async fn run_extension(
    params: RunExtension,
    fx: Fx,
    deps: Arc<Deps>,
) -> Result<(), EffectError> {
    let locale = fx.select(|s| s.user_preference.locale.clone());
    let host = StoreToolHost {
        fx: fx.clone(),
        platform: deps.platform.clone(),
        image_service: current_image_service(&fx, &deps),
        access_token: fx.select(|s| s.user_preference.access_token.clone()),
    };
    let runner = ToolRunner::new(deps.platform.tab.as_ref(), &host);
    let pathname = params.pathname.clone();
    let data = || {
        fx.select(|s| {
            s.clipper
                .clipper_data
                .get(&pathname)
                .cloned()
                .unwrap_or(Value::Null)
        })
    };

    let outcome = fx
        .try_call(runner.run(&params.extension, &locale, data))
        .await;
    if let Ok(result) = &outcome {
        fx.put(Action::ChangeData {
            pathname: params.pathname.clone(),
            data: result.clone(),
        });
    }
    fx.settle(params, outcome, Action::RunExtension)
}

/// Image service of the current account's first attached host.
fn current_image_service(fx: &Fx, deps: &Deps) -> Option<Box<dyn ImageHostingService>> {
    let hosting = fx.select(|s| {
        let account = s.current_account()?;
        account
            .image_hosting_ids
            .iter()
            .find_map(|id| s.user_preference.image_hosting_by_id(id))
            .cloned()
    })?;
    deps.registry
        .image_hosting_service_factory(&hosting.kind, &hosting.info)
}

/// Tool context capabilities backed by the platform adapters.
struct StoreToolHost {
    fx: Fx,
    platform: PlatformSet,
    image_service: Option<Box<dyn ImageHostingService>>,
    access_token: Option<String>,
}

fn capability_failed(capability: Capability) -> impl Fn(PlatformError) -> SandboxError {
    move |e| SandboxError::Capability {
        capability: capability.name(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ToolHost for StoreToolHost {
    fn notify(&self, message: &str) {
        self.fx.notify(Notification::info(message));
    }

    fn has_image_service(&self) -> bool {
        self.image_service.is_some()
    }

    async fn load_image(&self, url: &str) -> Result<ImageBlob, SandboxError> {
        self.platform
            .images
            .load(url)
            .await
            .map_err(capability_failed(Capability::LoadImage))
    }

    async fn capture_visible_tab(&self) -> Result<ImageBlob, SandboxError> {
        self.platform
            .tab
            .capture_visible_tab()
            .await
            .map_err(capability_failed(Capability::CaptureVisibleTab))
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), SandboxError> {
        self.platform
            .clipboard
            .write_text(text)
            .await
            .map_err(capability_failed(Capability::CopyToClipboard))
    }

    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.platform
            .downloads
            .download(file_name, content)
            .await
            .map_err(capability_failed(Capability::CreateAndDownloadFile))
    }

    async fn ocr(&self, image: &ImageBlob) -> Result<String, SandboxError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| SandboxError::Capability {
                capability: Capability::Ocr.name(),
                message: "powerpack login required".into(),
            })?;
        self.platform
            .powerpack
            .ocr(token, image)
            .await
            .map_err(capability_failed(Capability::Ocr))
    }

    async fn upload_image(&self, image: &ImageBlob) -> Result<String, SandboxError> {
        let capability = Capability::UploadImage.name();
        let service = self
            .image_service
            .as_ref()
            .ok_or_else(|| SandboxError::Capability {
                capability,
                message: "no image hosting attached to the current account".into(),
            })?;
        service
            .upload(image)
            .await
            .map_err(|e| SandboxError::Capability {
                capability,
                message: e.to_string(),
            })
    }
}

// -- Accounts --

pub async fn init_accounts(_: (), fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx.try_call(deps.repo.accounts()).await;
    fx.settle((), outcome, Action::InitAccounts)
}

/// Every attached host must exist and support the account's backend.
fn check_image_hosting(fx: &Fx, form: &AccountForm) -> Result<(), EffectError> {
    let state = fx.snapshot();
    let pref = &state.user_preference;
    let attached = form
        .image_hosting_ids
        .iter()
        .map(|id| {
            pref.image_hosting_by_id(id)
                .cloned()
                .ok_or_else(|| EffectError::Rejected(format!("image hosting {id} does not exist")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let compatible = filter_compatible(&form.kind, &attached, &pref.image_hosting_services_meta);
    match attached.iter().find(|h| !compatible.contains(h)) {
        Some(h) => Err(EffectError::Rejected(format!(
            "image hosting {} does not support {}",
            h.id, form.kind
        ))),
        None => Ok(()),
    }
}

/// Verify `form` and build the account it describes.
async fn verified_account(
    fx: &Fx,
    deps: &Deps,
    form: &AccountForm,
) -> Result<Account, EffectError> {
    let status = fx
        .try_call(verify_account(&deps.registry, &form.kind, &form.info))
        .await?;
    check_image_hosting(fx, form)?;
    let id = status
        .id
        .ok_or_else(|| EffectError::Rejected(format!("{} returned no account id", form.kind)))?;
    Ok(Account {
        id,
        kind: form.kind.clone(),
        info: form.info.clone(),
        default_repository_id: form.default_repository_id.clone(),
        image_hosting_ids: form.image_hosting_ids.clone(),
        user_info: status.user_info,
    })
}

/// Every id in `ids` names a persisted host. Checked again under the
/// repository lock, after the snapshot check, since a delete may have
/// landed in between.
fn ensure_hosts_exist(ids: &BTreeSet<String>, hosts: &[ImageHosting]) -> Result<(), EffectError> {
    match ids.iter().find(|id| !hosts.iter().any(|h| &h.id == *id)) {
        Some(id) => Err(EffectError::Rejected(format!(
            "image hosting {id} does not exist"
        ))),
        None => Ok(()),
    }
}

pub async fn add_account(form: AccountForm, fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = async {
        let account = verified_account(&fx, &deps, &form).await?;
        let accounts = fx
            .try_call(deps.repo.update_accounts::<EffectError>(|accounts, hosts| {
                ensure_hosts_exist(&account.image_hosting_ids, hosts)?;
                if accounts.iter().any(|a| a.id == account.id) {
                    return Err(EffectError::Rejected("account already exists".into()));
                }
                accounts.push(account.clone());
                Ok(())
            }))
            .await?;
        tracing::info!(id = %account.id, kind = %account.kind, "account added");
        Ok::<_, EffectError>(accounts)
    }
    .await;
    fx.settle(form, outcome, Action::AddAccount)
}

/// Replace an account's configuration. The account keeps its id.
pub async fn edit_account(params: EditAccount, fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = async {
        let edited = verified_account(&fx, &deps, &params.form).await?;
        fx.try_call(deps.repo.update_accounts::<EffectError>(|accounts, hosts| {
            ensure_hosts_exist(&edited.image_hosting_ids, hosts)?;
            let slot = accounts
                .iter_mut()
                .find(|a| a.id == params.id)
                .ok_or_else(|| {
                    EffectError::Rejected(format!("account {} does not exist", params.id))
                })?;
            *slot = Account {
                id: params.id.clone(),
                ..edited.clone()
            };
            Ok(())
        }))
        .await
    }
    .await;
    fx.settle(params, outcome, Action::EditAccount)
}

pub async fn delete_account(id: String, fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = fx
        .try_call(deps.repo.update_accounts::<EffectError>(|accounts, _| {
            let before = accounts.len();
            accounts.retain(|a| a.id != id);
            if accounts.len() == before {
                return Err(EffectError::Rejected(format!("account {id} does not exist")));
            }
            Ok(())
        }))
        .await;
    fx.settle(id, outcome, Action::DeleteAccount)
}

pub async fn change_account(id: String, fx: Fx, _deps: Arc<Deps>) -> Result<(), EffectError> {
    let outcome = if fx.select(|s| s.user_preference.account(&id).is_some()) {
        Ok(id.clone())
    } else {
        Err(EffectError::Rejected(format!("account {id} does not exist")))
    };
    fx.settle(id, outcome, Action::ChangeAccount)
}
