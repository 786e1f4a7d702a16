//! Account verification and image-host compatibility filtering.
//!
//! Verification resolves a provider through the registry, confirms the
//! credentials, and lists the destinations the account can save into.
//! [`AccountVerifier`] adds supersession on top: each attempt is tagged
//! with a sequence number and only the latest attempt may publish its
//! outcome. Older attempts still run to completion; their results are
//! discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::watch;

use crate::model::{Destination, ImageHosting, ImageHostingMeta, UserInfo};
use crate::registry::{ProviderError, ServiceRegistry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("unsupported provider: {0}")]
    Unsupported(String),
    #[error("verification failed: {0}")]
    Failed(#[from] ProviderError),
    #[error("superseded by a newer verification")]
    Superseded,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    pub verified: bool,
    pub user_info: Option<UserInfo>,
    pub repositories: Vec<Destination>,
    pub id: Option<String>,
}

/// Observable verification progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    Idle,
    Verifying { seq: u64 },
    Verified(AccountStatus),
    Failed(String),
}

/// Verify `form` against the provider registered as `kind`.
///
/// Fails with [`VerifyError::Unsupported`] before any provider call
/// when `kind` is not registered.
pub async fn verify_account(
    registry: &ServiceRegistry,
    kind: &str,
    form: &Value,
) -> Result<AccountStatus, VerifyError> {
    let service = registry
        .service_factory(kind, form)
        .ok_or_else(|| VerifyError::Unsupported(kind.to_string()))?;
    let user_info = service.verify().await?;
    let repositories = service.list_destinations().await?;
    tracing::debug!(kind, repositories = repositories.len(), "account verified");
    Ok(AccountStatus {
        verified: true,
        user_info: Some(user_info),
        repositories,
        id: Some(service.id()),
    })
}

/// Verification state for one account form.
pub struct AccountVerifier {
    registry: Arc<ServiceRegistry>,
    seq: AtomicU64,
    state: watch::Sender<VerificationState>,
}

impl AccountVerifier {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let (state, _) = watch::channel(VerificationState::Idle);
        Self {
            registry,
            seq: AtomicU64::new(0),
            state,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VerificationState> {
        self.state.subscribe()
    }

    /// Run a verification attempt, superseding any attempt in flight.
    ///
    /// Returns [`VerifyError::Superseded`] when a newer attempt started
    /// before this one finished; the state is then left to the newer
    /// attempt.
    pub async fn verify(&self, kind: &str, form: &Value) -> Result<AccountStatus, VerifyError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(VerificationState::Verifying { seq });

        let result = verify_account(&self.registry, kind, form).await;

        let published = self.state.send_if_modified(|state| {
            if self.seq.load(Ordering::SeqCst) != seq {
                return false;
            }
            *state = match &result {
                Ok(status) => VerificationState::Verified(status.clone()),
                Err(e) => VerificationState::Failed(e.to_string()),
            };
            true
        });

        if !published {
            tracing::debug!(seq, kind, "discarding stale verification result");
            return Err(VerifyError::Superseded);
        }
        result
    }
}

/// Image hosts usable with accounts of `backend_type`.
///
/// Hosts whose provider is not in `meta` are never compatible.
pub fn filter_compatible(
    backend_type: &str,
    hostings: &[ImageHosting],
    meta: &BTreeMap<String, ImageHostingMeta>,
) -> Vec<ImageHosting> {
    hostings
        .iter()
        .filter(|h| {
            meta.get(&h.kind)
                .is_some_and(|m| m.support.supports(backend_type))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Catalog;
    use crate::model::Compatibility;
    use crate::testing::{Gate, fake_image_hosting, fake_service, gated_service};
    use serde_json::json;

    fn registry() -> Arc<ServiceRegistry> {
        Arc::new(
            ServiceRegistry::builder()
                .service(fake_service("noteA"))
                .service(fake_service("noteB"))
                .image_hosting(fake_image_hosting(
                    "imgX",
                    Compatibility::Only(["noteB".to_string()].into()),
                ))
                .image_hosting(fake_image_hosting("imgAny", Compatibility::Any))
                .image_hosting(fake_image_hosting(
                    "imgA",
                    Compatibility::Only(["noteA".to_string()].into()),
                ))
                .build()
                .unwrap(),
        )
    }

    fn hosting(id: &str, kind: &str) -> ImageHosting {
        ImageHosting {
            id: id.into(),
            kind: kind.into(),
            info: json!({}),
            remark: String::new(),
        }
    }

    #[tokio::test]
    async fn valid_credentials_verify_with_repositories() {
        let status = verify_account(&registry(), "noteB", &json!({"token": "valid"}))
            .await
            .unwrap();
        assert!(status.verified);
        assert!(!status.repositories.is_empty());
        assert!(status.id.is_some());
        assert!(status.user_info.is_some());
    }

    #[tokio::test]
    async fn bad_credentials_fail() {
        let err = verify_account(&registry(), "noteA", &json!({"token": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Failed(ProviderError::Rejected(_))));
    }

    #[tokio::test]
    async fn unknown_type_is_unsupported() {
        let err = verify_account(&registry(), "mystery", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, VerifyError::Unsupported("mystery".into()));
    }

    #[tokio::test]
    async fn verifier_tracks_state() {
        let v = AccountVerifier::new(registry());
        assert_eq!(v.state(), VerificationState::Idle);
        v.verify("noteA", &json!({"token": "valid"})).await.unwrap();
        assert!(matches!(v.state(), VerificationState::Verified(_)));
        v.verify("noteA", &json!({"token": "bad"})).await.unwrap_err();
        assert!(matches!(v.state(), VerificationState::Failed(_)));
    }

    #[tokio::test]
    async fn newer_attempt_supersedes_older() {
        let gate = Gate::new();
        let registry = Arc::new(
            ServiceRegistry::builder()
                .service(gated_service("slow", gate.clone()))
                .service(fake_service("noteA"))
                .build()
                .unwrap(),
        );
        let v = Arc::new(AccountVerifier::new(registry));

        let first = {
            let v = v.clone();
            tokio::spawn(async move { v.verify("slow", &json!({"token": "valid"})).await })
        };
        // Let the first attempt reach its provider call.
        gate.wait_entered().await;

        let second = v.verify("noteA", &json!({"token": "valid"})).await.unwrap();
        gate.open();

        assert_eq!(first.await.unwrap(), Err(VerifyError::Superseded));
        assert_eq!(v.state(), VerificationState::Verified(second));
    }

    #[test]
    fn filter_keeps_only_compatible_hosts() {
        let r = registry();
        let meta = r.image_hosting_services_meta(&Catalog::new(), "en-US");
        let hosts = vec![
            hosting("h1", "imgX"),
            hosting("h2", "imgAny"),
            hosting("h3", "imgA"),
            hosting("h4", "unregistered"),
        ];
        let ids: Vec<String> = filter_compatible("noteB", &hosts, &meta)
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["h1", "h2"]);
    }

    #[test]
    fn filter_is_pure() {
        let r = registry();
        let meta = r.image_hosting_services_meta(&Catalog::new(), "en-US");
        let hosts = vec![hosting("h1", "imgX"), hosting("h3", "imgA")];
        let first = filter_compatible("noteA", &hosts, &meta);
        let second = filter_compatible("noteA", &hosts, &meta);
        assert_eq!(first, second);
        assert_eq!(hosts.len(), 2);
    }
}
