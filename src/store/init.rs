//! Startup sequence.
//!
//! Hooks run strictly one after another; later steps read what earlier
//! ones put into state. Only the locale step is fatal: without a
//! locale there is nothing to localize provider metadata against.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::effects::{EffectError, Effects, Lifecycle, Notification, Runtime};
use crate::locale::resolve_locale;
use crate::model::{TabInfo, UserPreference};
use crate::storage::{ACCESS_TOKEN_KEY, LOCALE_KEY};

use super::action::Action;
use super::handlers::services_meta;
use super::{Deps, PreferenceModel};

type Fx = Effects<PreferenceModel>;

pub fn register(runtime: Runtime<PreferenceModel>, deps: &Arc<Deps>) -> Runtime<PreferenceModel> {
    let (d1, d2, d3, d4, d5) = (
        Arc::clone(deps),
        Arc::clone(deps),
        Arc::clone(deps),
        Arc::clone(deps),
        Arc::clone(deps),
    );
    runtime
        .on_init("accounts", |fx| async move {
            fx.put_and_settle(Action::InitAccounts(Lifecycle::Started(())))
                .await
        })
        .on_init("preference", move |fx| hydrate_preference(fx, d1))
        .on_init("locale", move |fx| init_locale(fx, d2))
        .on_init("storageChanges", move |fx| watch_storage(fx, d3))
        .on_init("session", |fx| async move {
            fx.put(Action::InitPowerpack(Lifecycle::Started(())));
            fx.put(Action::FetchRemoteConfig(Lifecycle::Started(())));
            Ok(())
        })
        .on_init("tabInfo", move |fx| init_tab_info(fx, d4))
        .on_init("defaults", move |fx| activate_defaults(fx, d5))
}

async fn hydrate_preference(fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let preference = match fx.try_call(deps.repo.load_preference()).await {
        Ok(preference) => preference,
        Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
        Err(e) => {
            tracing::warn!(error = %e, "preference unreadable, using defaults");
            fx.notify(Notification::error(e.to_string()));
            UserPreference::default()
        }
    };
    fx.put(Action::InitUserPreference(preference));
    Ok(())
}

async fn init_locale(fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let stored = fx.try_call(deps.repo.locale()).await?;
    let locale = resolve_locale(stored, &deps.config.fallback_locale);
    tracing::info!(%locale, "locale resolved");
    fx.put(Action::SetLocale(locale.clone()));
    fx.put(Action::InitServices(services_meta(&deps, &locale)));
    Ok(())
}

/// Follow the locale and access-token keys for the life of the store.
async fn watch_storage(fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let mut changes = deps.repo.gateway().subscribe();
    let watcher_fx = fx.clone();
    fx.spawn_watcher("storageChanges", async move {
        let fx = watcher_fx;
        loop {
            match fx.call(changes.recv()).await? {
                Ok(key) if key == LOCALE_KEY => locale_changed(&fx, &deps).await?,
                Ok(key) if key == ACCESS_TOKEN_KEY => {
                    fx.put(Action::InitPowerpack(Lifecycle::Started(())));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "storage changes lagged, resyncing");
                    locale_changed(&fx, &deps).await?;
                    fx.put(Action::InitPowerpack(Lifecycle::Started(())));
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    });
    Ok(())
}

async fn locale_changed(fx: &Fx, deps: &Deps) -> Result<(), EffectError> {
    let stored = match fx.try_call(deps.repo.locale()).await {
        Ok(stored) => stored,
        Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
        Err(e) => {
            tracing::warn!(error = %e, "locale change unreadable");
            fx.notify(Notification::error(e.to_string()));
            return Ok(());
        }
    };
    let locale = resolve_locale(stored, &deps.config.fallback_locale);
    tracing::debug!(%locale, "locale changed");
    fx.put(Action::SetLocale(locale.clone()));
    fx.put(Action::LoadExtensions);
    fx.put(Action::InitServices(services_meta(deps, &locale)));
    Ok(())
}

async fn init_tab_info(fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    match fx.try_call(deps.platform.tab.current_tab()).await {
        Ok(Some(tab)) => {
            if let (Some(title), Some(url)) = (tab.title, tab.url) {
                fx.put(Action::InitTabInfo(TabInfo { title, url }));
            }
        }
        Ok(None) => {}
        Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
        Err(e) => tracing::warn!(error = %e, "current tab unavailable"),
    }
    Ok(())
}

/// Open the default plugin and account, only from the root route.
async fn activate_defaults(fx: Fx, deps: Arc<Deps>) -> Result<(), EffectError> {
    let route = fx.select(|s| s.clipper.route.clone());
    if route != "/" {
        tracing::debug!(%route, "not at root route, skipping defaults");
        return Ok(());
    }
    let preference = match fx.try_call(deps.repo.load_preference()).await {
        Ok(preference) => preference,
        Err(EffectError::Cancelled) => return Err(EffectError::Cancelled),
        Err(e) => {
            tracing::warn!(error = %e, "defaults unreadable");
            return Ok(());
        }
    };
    if let Some(id) = preference.default_plugin_id {
        fx.put(Action::Navigate(format!("/plugins/{id}")));
    }
    if let Some(id) = preference.default_account_id {
        fx.put(Action::ChangeAccount(Lifecycle::Started(id)));
    }
    Ok(())
}
