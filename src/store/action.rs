//! Action vocabulary of the preference store.
//!
//! Asynchronous operations are [`Lifecycle`] triplets; everything else
//! is a plain action applied by the reducer alone.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::effects::{Lifecycle, Phase};
use crate::model::{
    Account, ImageHosting, ImageHostingMeta, ProviderMeta, TabInfo, UserInfo, UserPreference,
};
use crate::sandbox::ToolExtension;

/// Match the `Started` phase of a triplet variant and clone its params.
macro_rules! started {
    ($variant:ident) => {
        |action: &$crate::store::Action| match action {
            $crate::store::Action::$variant($crate::effects::Lifecycle::Started(params)) => {
                Some(params.clone())
            }
            _ => None,
        }
    };
}

pub(crate) use started;

/// Form values for a new or edited image host.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHostingForm {
    pub kind: String,
    pub info: Value,
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditImageHosting {
    pub id: String,
    pub form: ImageHostingForm,
}

/// Result of deleting an image host: both lists after detaching it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedImageHosting {
    pub image_hosting: Vec<ImageHosting>,
    pub accounts: Vec<Account>,
}

/// Form values for a new or edited account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountForm {
    pub kind: String,
    pub info: Value,
    pub default_repository_id: Option<String>,
    pub image_hosting_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditAccount {
    pub id: String,
    pub form: AccountForm,
}

/// Localized provider metadata for both families.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicesMeta {
    pub services_meta: BTreeMap<String, ProviderMeta>,
    pub image_hosting_services_meta: BTreeMap<String, ImageHostingMeta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerpackSession {
    pub access_token: Option<String>,
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IconfontConfig {
    pub iconfont_url: String,
    pub iconfont_icons: Vec<String>,
}

/// A tool run against the clip data of `pathname`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunExtension {
    pub pathname: String,
    pub extension: ToolExtension,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // -- Preference --
    InitUserPreference(UserPreference),
    SetShowLineNumber(Lifecycle<(), bool>),
    SetEditorLiveRendering(Lifecycle<(), bool>),
    SetLocale(String),
    SetLocaleToStorage(Lifecycle<String, ()>),
    InitServices(ServicesMeta),
    InitPowerpack(Lifecycle<(), PowerpackSession>),
    LoginWithToken(Lifecycle<String, ()>),
    FetchRemoteConfig(Lifecycle<(), IconfontConfig>),
    AddImageHosting(Lifecycle<ImageHostingForm, Vec<ImageHosting>>),
    EditImageHosting(Lifecycle<EditImageHosting, Vec<ImageHosting>>),
    DeleteImageHosting(Lifecycle<String, DeletedImageHosting>),
    HideTool(Lifecycle<(), ()>),
    RemoveTool(Lifecycle<(), ()>),
    RunExtension(Lifecycle<RunExtension, Value>),
    /// Signal for the surrounding application to reload its extensions.
    LoadExtensions,

    // -- Accounts --
    InitAccounts(Lifecycle<(), Vec<Account>>),
    AddAccount(Lifecycle<AccountForm, Vec<Account>>),
    EditAccount(Lifecycle<EditAccount, Vec<Account>>),
    DeleteAccount(Lifecycle<String, Vec<Account>>),
    ChangeAccount(Lifecycle<String, String>),

    // -- Clipper --
    InitTabInfo(TabInfo),
    ChangeData { pathname: String, data: Value },
    Navigate(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::InitUserPreference(_) => "initUserPreference",
            Action::SetShowLineNumber(_) => "setShowLineNumber",
            Action::SetEditorLiveRendering(_) => "setEditorLiveRendering",
            Action::SetLocale(_) => "setLocale",
            Action::SetLocaleToStorage(_) => "setLocaleToStorage",
            Action::InitServices(_) => "initServices",
            Action::InitPowerpack(_) => "initPowerpack",
            Action::LoginWithToken(_) => "loginWithToken",
            Action::FetchRemoteConfig(_) => "fetchRemoteConfig",
            Action::AddImageHosting(_) => "addImageHosting",
            Action::EditImageHosting(_) => "editImageHosting",
            Action::DeleteImageHosting(_) => "deleteImageHosting",
            Action::HideTool(_) => "hideTool",
            Action::RemoveTool(_) => "removeTool",
            Action::RunExtension(_) => "runExtension",
            Action::LoadExtensions => "loadExtensions",
            Action::InitAccounts(_) => "initAccounts",
            Action::AddAccount(_) => "addAccount",
            Action::EditAccount(_) => "editAccount",
            Action::DeleteAccount(_) => "deleteAccount",
            Action::ChangeAccount(_) => "changeAccount",
            Action::InitTabInfo(_) => "initTabInfo",
            Action::ChangeData { .. } => "changeData",
            Action::Navigate(_) => "navigate",
        }
    }

    /// Triplet phase, `None` for plain actions.
    pub fn phase(&self) -> Option<Phase> {
        Some(match self {
            Action::SetShowLineNumber(l) | Action::SetEditorLiveRendering(l) => l.phase(),
            Action::SetLocaleToStorage(l) => l.phase(),
            Action::InitPowerpack(l) => l.phase(),
            Action::LoginWithToken(l) => l.phase(),
            Action::FetchRemoteConfig(l) => l.phase(),
            Action::AddImageHosting(l) => l.phase(),
            Action::EditImageHosting(l) => l.phase(),
            Action::DeleteImageHosting(l) => l.phase(),
            Action::HideTool(l) | Action::RemoveTool(l) => l.phase(),
            Action::RunExtension(l) => l.phase(),
            Action::InitAccounts(l) => l.phase(),
            Action::AddAccount(l) => l.phase(),
            Action::EditAccount(l) => l.phase(),
            Action::DeleteAccount(l) => l.phase(),
            Action::ChangeAccount(l) => l.phase(),
            Action::InitUserPreference(_)
            | Action::SetLocale(_)
            | Action::InitServices(_)
            | Action::LoadExtensions
            | Action::InitTabInfo(_)
            | Action::ChangeData { .. }
            | Action::Navigate(_) => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplet_phases() {
        assert_eq!(
            Action::SetShowLineNumber(Lifecycle::Started(())).phase(),
            Some(Phase::Started)
        );
        assert_eq!(
            Action::DeleteAccount(Lifecycle::failed("a1".to_string(), "gone")).phase(),
            Some(Phase::Failed)
        );
        assert_eq!(Action::SetLocale("en-US".into()).phase(), None);
    }

    #[test]
    fn started_extracts_params_only_from_started() {
        let extract = started!(LoginWithToken);
        assert_eq!(
            extract(&Action::LoginWithToken(Lifecycle::Started("tok".into()))),
            Some("tok".to_string())
        );
        assert_eq!(
            extract(&Action::LoginWithToken(Lifecycle::done("tok".into(), ()))),
            None
        );
        assert_eq!(extract(&Action::LoadExtensions), None);
    }
}
