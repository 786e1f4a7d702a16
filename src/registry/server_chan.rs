//! ServerChan push channel.
//!
//! A push service has no folders: the channel itself is the only
//! destination. The message endpoint is outside this core, so
//! verification only checks that a send key is configured.

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Destination, UserInfo};

use super::{
    LocalizedName, NoteService, NoteServiceRegistration, ProviderDescriptor, ProviderError,
    stable_id,
};

pub const KIND: &str = "server_chan";
const HOME_PAGE: &str = "https://sc.ftqq.com/";

pub fn registration() -> NoteServiceRegistration {
    NoteServiceRegistration::new(
        ProviderDescriptor {
            kind: KIND.into(),
            name: LocalizedName::new("backend.services.server_chan.name", "ServerChan"),
            icon: "wechat".into(),
            home_page: HOME_PAGE.into(),
        },
        |config| Box::new(ServerChan::from_config(config)),
    )
}

#[derive(Debug, Clone)]
pub struct ServerChan {
    sckey: Option<String>,
    config: Value,
}

impl ServerChan {
    pub fn from_config(config: &Value) -> Self {
        let sckey = config
            .get("sckey")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from);
        Self {
            sckey,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl NoteService for ServerChan {
    fn id(&self) -> String {
        stable_id(KIND, &self.config)
    }

    async fn verify(&self) -> Result<UserInfo, ProviderError> {
        if self.sckey.is_none() {
            return Err(ProviderError::Rejected("sckey is required".into()));
        }
        Ok(UserInfo {
            name: "ServerChan".into(),
            avatar: None,
            home_page: Some(HOME_PAGE.into()),
            description: None,
        })
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>, ProviderError> {
        Ok(vec![Destination {
            id: KIND.into(),
            name: "ServerChan".into(),
            group_id: KIND.into(),
            group_name: "ServerChan".into(),
        }])
    }
}
