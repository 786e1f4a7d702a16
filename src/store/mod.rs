//! Preference store - the root component.
//!
//! Architecture: the effect runtime's single-writer loop owns an
//! [`AppState`]. This module supplies the action vocabulary, the
//! reducer, one handler per triplet and the startup sequence, then
//! starts the loop and waits for startup to finish.
//!
//! Collaborators arrive bundled in [`Deps`]: the storage gateway behind
//! a [`PreferenceRepository`], the frozen service registry, a message
//! catalog and the platform adapters. Nothing here reaches the host
//! environment directly.

pub mod action;
mod handlers;
mod init;
mod reducer;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

pub use action::Action;
use action::started;

use crate::config::StoreConfig;
use crate::effects::{EffectError, Lifecycle, Model, Notification, Phase, Runtime, RuntimeHandle};
use crate::locale::MessageCatalog;
use crate::model::{AppState, ImageHosting, ImageHostingMeta, PreferenceState, ProviderMeta};
use crate::platform::PlatformSet;
use crate::registry::ServiceRegistry;
use crate::storage::{PreferenceRepository, StorageGateway};
use crate::verify::{AccountVerifier, filter_compatible};

/// Store startup errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store bootstrap failed: {0}")]
    Bootstrap(#[source] EffectError),
    #[error("store stopped during bootstrap")]
    Stopped,
}

/// Everything the handlers reach outside the state.
pub struct Deps {
    pub repo: PreferenceRepository,
    pub registry: Arc<ServiceRegistry>,
    pub catalog: Arc<dyn MessageCatalog>,
    pub platform: PlatformSet,
    pub config: StoreConfig,
}

impl Deps {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        registry: ServiceRegistry,
        catalog: Arc<dyn MessageCatalog>,
        platform: PlatformSet,
        config: StoreConfig,
    ) -> Self {
        Self {
            repo: PreferenceRepository::new(storage),
            registry: Arc::new(registry),
            catalog,
            platform,
            config,
        }
    }
}

pub struct PreferenceModel;

impl Model for PreferenceModel {
    type State = AppState;
    type Action = Action;

    fn reduce(state: &AppState, action: &Action) -> Option<AppState> {
        reducer::reduce(state, action)
    }

    fn action_name(action: &Action) -> &'static str {
        action.name()
    }

    fn action_phase(action: &Action) -> Option<Phase> {
        action.phase()
    }
}

/// Register one `take_every` handler per `name => Variant => handler`
/// row, each answering the `Started` phase of `Variant`.
macro_rules! on_started {
    ($runtime:expr, $deps:expr; $($name:literal => $variant:ident => $handler:path),* $(,)?) => {{
        let rt = $runtime;
        $(
            let rt = {
                let deps = Arc::clone($deps);
                rt.take_every($name, started!($variant), move |params, fx| {
                    $handler(params, fx, Arc::clone(&deps))
                })
            };
        )*
        rt
    }};
}

fn runtime(deps: &Arc<Deps>) -> Runtime<PreferenceModel> {
    let rt = on_started! { Runtime::new(), deps;
        "setShowLineNumber" => SetShowLineNumber => handlers::set_show_line_number,
        "setEditorLiveRendering" => SetEditorLiveRendering => handlers::set_editor_live_rendering,
        "setLocaleToStorage" => SetLocaleToStorage => handlers::set_locale_to_storage,
        "initPowerpack" => InitPowerpack => handlers::init_powerpack,
        "loginWithToken" => LoginWithToken => handlers::login_with_token,
        "fetchRemoteConfig" => FetchRemoteConfig => handlers::fetch_remote_config,
        "addImageHosting" => AddImageHosting => handlers::add_image_hosting,
        "editImageHosting" => EditImageHosting => handlers::edit_image_hosting,
        "deleteImageHosting" => DeleteImageHosting => handlers::delete_image_hosting,
        "hideTool" => HideTool => handlers::hide_tool,
        "removeTool" => RemoveTool => handlers::remove_tool,
        "runExtension" => RunExtension => handlers::run_extension,
        "initAccounts" => InitAccounts => handlers::init_accounts,
        "addAccount" => AddAccount => handlers::add_account,
        "editAccount" => EditAccount => handlers::edit_account,
        "deleteAccount" => DeleteAccount => handlers::delete_account,
        "changeAccount" => ChangeAccount => handlers::change_account,
    };
    init::register(rt, deps)
}

/// Start the store and run the startup sequence.
///
/// # Errors
///
/// Returns `StoreError::Bootstrap` when a fatal startup step fails
/// (the persisted locale cannot be read). The loop is stopped first.
pub async fn start(deps: Deps) -> Result<StoreHandle, StoreError> {
    let deps = Arc::new(deps);
    let initial = AppState::new(
        deps.config.fallback_locale.clone(),
        deps.config.initial_route.clone(),
    );
    let (runtime, ready) = runtime(&deps).start(initial, deps.config.notification_capacity);

    match ready.await {
        Ok(Ok(())) => {
            tracing::info!("preference store ready");
            Ok(StoreHandle {
                verifier: AccountVerifier::new(Arc::clone(&deps.registry)),
                runtime,
                deps,
            })
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "preference store bootstrap failed");
            runtime.shutdown().await;
            Err(StoreError::Bootstrap(e))
        }
        Err(_) => {
            runtime.shutdown().await;
            Err(StoreError::Stopped)
        }
    }
}

/// Read and dispatch access to a running store.
pub struct StoreHandle {
    runtime: RuntimeHandle<PreferenceModel>,
    deps: Arc<Deps>,
    verifier: AccountVerifier,
}

impl StoreHandle {
    pub fn get_state(&self) -> Arc<AppState> {
        self.runtime.state()
    }

    pub fn preference(&self) -> PreferenceState {
        self.get_state().user_preference.clone()
    }

    pub fn dispatch(&self, action: Action) {
        self.runtime.dispatch(action);
    }

    /// Resolve once no action is queued and no handler is running.
    pub async fn settled(&self) {
        self.runtime.settled().await;
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&AppState) -> bool) -> Arc<AppState> {
        self.runtime.wait_for(predicate).await
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Arc<AppState>> {
        self.runtime.subscribe_state()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.runtime.subscribe_notifications()
    }

    /// Verification state for the account form of the surrounding UI.
    pub fn verifier(&self) -> &AccountVerifier {
        &self.verifier
    }

    /// Note services in the current locale, ordered by type.
    pub fn services(&self) -> Vec<ProviderMeta> {
        let locale = self.get_state().user_preference.locale.clone();
        self.deps.registry.services(self.deps.catalog.as_ref(), &locale)
    }

    /// Image hosts in the current locale, ordered by type.
    pub fn image_hosting_services(&self) -> Vec<ImageHostingMeta> {
        let locale = self.get_state().user_preference.locale.clone();
        self.deps
            .registry
            .image_hosting_services(self.deps.catalog.as_ref(), &locale)
    }

    /// Configured image hosts usable with `backend_type` accounts.
    pub fn compatible_image_hosting(&self, backend_type: &str) -> Vec<ImageHosting> {
        let state = self.get_state();
        let pref = &state.user_preference;
        filter_compatible(
            backend_type,
            &pref.image_hosting,
            &pref.image_hosting_services_meta,
        )
    }

    /// Cancel pending effects and stop the loop.
    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
        tracing::info!("preference store stopped");
    }
}

/// Shorthand for dispatching the `Started` phase of a triplet.
pub fn start_action<P, R>(wrap: impl FnOnce(Lifecycle<P, R>) -> Action, params: P) -> Action {
    wrap(Lifecycle::Started(params))
}
