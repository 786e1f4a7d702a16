//! Pure state transitions.
//!
//! Started and failed phases never touch state: nothing is committed
//! before the operation confirms. Lists are always replaced whole.

use crate::effects::Lifecycle;
use crate::model::AppState;

use super::action::{Action, DeletedImageHosting, IconfontConfig, PowerpackSession, ServicesMeta};

pub fn reduce(state: &AppState, action: &Action) -> Option<AppState> {
    let mut next = state.clone();
    let pref = &mut next.user_preference;
    match action {
        Action::InitUserPreference(p) => {
            pref.image_hosting = p.image_hosting.clone();
            pref.show_line_number = p.show_line_number;
            pref.live_rendering = p.live_rendering;
            pref.default_plugin_id = p.default_plugin_id.clone();
        }
        Action::SetShowLineNumber(Lifecycle::Done { result, .. }) => {
            pref.show_line_number = *result;
        }
        Action::SetEditorLiveRendering(Lifecycle::Done { result, .. }) => {
            pref.live_rendering = *result;
        }
        Action::SetLocale(locale)
        | Action::SetLocaleToStorage(Lifecycle::Done { params: locale, .. }) => {
            pref.locale = locale.clone();
        }
        Action::InitServices(ServicesMeta {
            services_meta,
            image_hosting_services_meta,
        }) => {
            pref.services_meta = services_meta.clone();
            pref.image_hosting_services_meta = image_hosting_services_meta.clone();
        }
        Action::InitPowerpack(Lifecycle::Done {
            result: PowerpackSession {
                access_token,
                user_info,
            },
            ..
        }) => {
            pref.access_token = access_token.clone();
            pref.user_info = user_info.clone();
        }
        Action::FetchRemoteConfig(Lifecycle::Done {
            result: IconfontConfig {
                iconfont_url,
                iconfont_icons,
            },
            ..
        }) => {
            pref.iconfont_url = iconfont_url.clone();
            pref.iconfont_icons = iconfont_icons.clone();
        }
        Action::AddImageHosting(Lifecycle::Done { result, .. })
        | Action::EditImageHosting(Lifecycle::Done { result, .. }) => {
            pref.image_hosting = result.clone();
        }
        Action::DeleteImageHosting(Lifecycle::Done {
            result:
                DeletedImageHosting {
                    image_hosting,
                    accounts,
                },
            ..
        }) => {
            pref.image_hosting = image_hosting.clone();
            pref.accounts = accounts.clone();
        }
        Action::InitAccounts(Lifecycle::Done { result, .. })
        | Action::AddAccount(Lifecycle::Done { result, .. })
        | Action::EditAccount(Lifecycle::Done { result, .. }) => {
            pref.accounts = result.clone();
        }
        Action::DeleteAccount(Lifecycle::Done { params, result }) => {
            pref.accounts = result.clone();
            if next.clipper.current_account_id.as_ref() == Some(params) {
                next.clipper.current_account_id = None;
            }
        }
        Action::ChangeAccount(Lifecycle::Done { result, .. }) => {
            next.clipper.current_account_id = Some(result.clone());
        }
        Action::InitTabInfo(tab) => next.clipper.tab_info = Some(tab.clone()),
        Action::ChangeData { pathname, data } => {
            next.clipper
                .clipper_data
                .insert(pathname.clone(), data.clone());
        }
        Action::Navigate(route) => next.clipper.route = route.clone(),
        _ => return None,
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Account, ImageHosting};
    use crate::store::action::ImageHostingForm;
    use serde_json::json;

    fn hosting(id: &str) -> ImageHosting {
        ImageHosting {
            id: id.into(),
            kind: "imgX".into(),
            info: json!({}),
            remark: String::new(),
        }
    }

    fn account(id: &str, hosts: &[&str]) -> Account {
        Account {
            id: id.into(),
            kind: "noteA".into(),
            info: json!({}),
            default_repository_id: None,
            image_hosting_ids: hosts.iter().map(|h| h.to_string()).collect(),
            user_info: None,
        }
    }

    fn form() -> ImageHostingForm {
        ImageHostingForm {
            kind: "imgX".into(),
            info: json!({}),
            remark: String::new(),
        }
    }

    #[test]
    fn started_and_failed_leave_state() {
        let state = AppState::new("en-US", "/");
        assert!(reduce(&state, &Action::AddImageHosting(Lifecycle::Started(form()))).is_none());
        assert!(reduce(&state, &Action::AddImageHosting(Lifecycle::failed(form(), "x"))).is_none());
        assert!(reduce(&state, &Action::SetShowLineNumber(Lifecycle::failed((), "x"))).is_none());
    }

    #[test]
    fn done_is_idempotent() {
        let state = AppState::new("en-US", "/");
        let done = Action::AddImageHosting(Lifecycle::done(form(), vec![hosting("h1")]));
        let once = reduce(&state, &done).unwrap();
        let twice = reduce(&once, &done).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.user_preference.image_hosting.len(), 1);
    }

    #[test]
    fn input_state_untouched() {
        let state = AppState::new("en-US", "/");
        let next = reduce(&state, &Action::SetLocale("zh-CN".into())).unwrap();
        assert_eq!(state.user_preference.locale, "en-US");
        assert_eq!(next.user_preference.locale, "zh-CN");
    }

    #[test]
    fn delete_replaces_both_lists() {
        let mut state = AppState::new("en-US", "/");
        state.user_preference.image_hosting = vec![hosting("h1"), hosting("h2")];
        state.user_preference.accounts = vec![account("a1", &["h1", "h2"])];
        let next = reduce(
            &state,
            &Action::DeleteImageHosting(Lifecycle::done(
                "h1".to_string(),
                DeletedImageHosting {
                    image_hosting: vec![hosting("h2")],
                    accounts: vec![account("a1", &["h2"])],
                },
            )),
        )
        .unwrap();
        assert!(next.user_preference.dangling_image_hosting_refs().is_empty());
        assert_eq!(next.user_preference.image_hosting, vec![hosting("h2")]);
    }

    #[test]
    fn deleting_current_account_clears_selection() {
        let mut state = AppState::new("en-US", "/");
        state.user_preference.accounts = vec![account("a1", &[])];
        state.clipper.current_account_id = Some("a1".into());
        let next = reduce(
            &state,
            &Action::DeleteAccount(Lifecycle::done("a1".to_string(), vec![])),
        )
        .unwrap();
        assert_eq!(next.clipper.current_account_id, None);
    }

    #[test]
    fn change_data_is_keyed_by_route() {
        let state = AppState::new("en-US", "/");
        let next = reduce(
            &state,
            &Action::ChangeData {
                pathname: "/plugins/a".into(),
                data: json!("x"),
            },
        )
        .unwrap();
        assert_eq!(next.clipper.clipper_data["/plugins/a"], json!("x"));
    }
}
