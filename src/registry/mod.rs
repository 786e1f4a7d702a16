//! Service registry - pluggable note services and image hosts.
//!
//! Providers are collected into an immutable table at startup through
//! [`RegistryBuilder`]. Lookups are keyed by provider type, so the
//! order in which providers register never matters. Display names are
//! resolved against a [`MessageCatalog`] at read time, which lets the
//! store recompute metadata whenever the locale changes.

pub mod server_chan;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::locale::MessageCatalog;
use crate::model::{Compatibility, Destination, ImageBlob, ImageHostingMeta, ProviderMeta, UserInfo};

/// Errors reported by provider capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused the credentials or request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The provider could not be reached.
    #[error("network: {0}")]
    Network(String),
    /// The provider does not implement the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Registry construction errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate note service type: {0}")]
    DuplicateService(String),
    #[error("duplicate image hosting type: {0}")]
    DuplicateImageHosting(String),
}

/// A configured note-destination service.
#[async_trait]
pub trait NoteService: Send + Sync {
    /// Account id for the configured credentials. Stable for identical
    /// configuration.
    fn id(&self) -> String;

    /// Confirm access and return the account's user info.
    async fn verify(&self) -> Result<UserInfo, ProviderError>;

    /// Destinations a clip can be saved into, in display order.
    async fn list_destinations(&self) -> Result<Vec<Destination>, ProviderError>;
}

/// A configured image-hosting service.
#[async_trait]
pub trait ImageHostingService: Send + Sync {
    /// Host id. Stable for identical configuration.
    fn id(&self) -> String;

    /// Upload an image and return its public URL.
    async fn upload(&self, image: &ImageBlob) -> Result<String, ProviderError>;
}

pub type NoteServiceFactory = Arc<dyn Fn(&Value) -> Box<dyn NoteService> + Send + Sync>;
pub type ImageHostingFactory = Arc<dyn Fn(&Value) -> Box<dyn ImageHostingService> + Send + Sync>;

/// Message id plus default text for a provider's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedName {
    pub message_id: String,
    pub default_message: String,
}

impl LocalizedName {
    pub fn new(message_id: impl Into<String>, default_message: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            default_message: default_message.into(),
        }
    }

    fn resolve(&self, catalog: &dyn MessageCatalog, locale: &str) -> String {
        catalog.format(locale, &self.message_id, &self.default_message)
    }
}

/// Descriptive fields every registration carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: String,
    pub name: LocalizedName,
    pub icon: String,
    pub home_page: String,
}

impl ProviderDescriptor {
    fn meta(&self, catalog: &dyn MessageCatalog, locale: &str) -> ProviderMeta {
        ProviderMeta {
            kind: self.kind.clone(),
            name: self.name.resolve(catalog, locale),
            icon: self.icon.clone(),
            home_page: self.home_page.clone(),
        }
    }
}

/// One note service: metadata plus its capability factory.
#[derive(Clone)]
pub struct NoteServiceRegistration {
    pub descriptor: ProviderDescriptor,
    pub factory: NoteServiceFactory,
}

impl NoteServiceRegistration {
    pub fn new<F>(descriptor: ProviderDescriptor, factory: F) -> Self
    where
        F: Fn(&Value) -> Box<dyn NoteService> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            factory: Arc::new(factory),
        }
    }
}

/// One image host: metadata, backend compatibility, capability factory.
#[derive(Clone)]
pub struct ImageHostingRegistration {
    pub descriptor: ProviderDescriptor,
    pub support: Compatibility,
    pub factory: ImageHostingFactory,
}

impl ImageHostingRegistration {
    pub fn new<F>(descriptor: ProviderDescriptor, support: Compatibility, factory: F) -> Self
    where
        F: Fn(&Value) -> Box<dyn ImageHostingService> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            support,
            factory: Arc::new(factory),
        }
    }
}

/// Collects registrations before the store starts.
#[derive(Default)]
pub struct RegistryBuilder {
    services: Vec<NoteServiceRegistration>,
    image_hosting: Vec<ImageHostingRegistration>,
}

impl RegistryBuilder {
    pub fn service(mut self, registration: NoteServiceRegistration) -> Self {
        self.services.push(registration);
        self
    }

    pub fn image_hosting(mut self, registration: ImageHostingRegistration) -> Self {
        self.image_hosting.push(registration);
        self
    }

    /// Freeze the table.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` when two providers of the same family
    /// claim the same type.
    pub fn build(self) -> Result<ServiceRegistry, RegistryError> {
        let mut services = BTreeMap::new();
        for registration in self.services {
            let kind = registration.descriptor.kind.clone();
            if services.insert(kind.clone(), registration).is_some() {
                return Err(RegistryError::DuplicateService(kind));
            }
        }
        let mut image_hosting = BTreeMap::new();
        for registration in self.image_hosting {
            let kind = registration.descriptor.kind.clone();
            if image_hosting.insert(kind.clone(), registration).is_some() {
                return Err(RegistryError::DuplicateImageHosting(kind));
            }
        }
        tracing::debug!(
            services = services.len(),
            image_hosting = image_hosting.len(),
            "service registry built"
        );
        Ok(ServiceRegistry {
            services,
            image_hosting,
        })
    }
}

/// Immutable provider table.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, NoteServiceRegistration>,
    image_hosting: BTreeMap<String, ImageHostingRegistration>,
}

impl ServiceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding the built-in providers.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` when two built-in providers claim the
    /// same type.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::builder().service(server_chan::registration()).build()
    }

    /// Note-service metadata ordered by type.
    pub fn services(&self, catalog: &dyn MessageCatalog, locale: &str) -> Vec<ProviderMeta> {
        self.services
            .values()
            .map(|r| r.descriptor.meta(catalog, locale))
            .collect()
    }

    /// Image-hosting metadata ordered by type.
    pub fn image_hosting_services(
        &self,
        catalog: &dyn MessageCatalog,
        locale: &str,
    ) -> Vec<ImageHostingMeta> {
        self.image_hosting
            .values()
            .map(|r| ImageHostingMeta {
                meta: r.descriptor.meta(catalog, locale),
                support: r.support.clone(),
            })
            .collect()
    }

    pub fn services_meta(
        &self,
        catalog: &dyn MessageCatalog,
        locale: &str,
    ) -> BTreeMap<String, ProviderMeta> {
        self.services(catalog, locale)
            .into_iter()
            .map(|meta| (meta.kind.clone(), meta))
            .collect()
    }

    pub fn image_hosting_services_meta(
        &self,
        catalog: &dyn MessageCatalog,
        locale: &str,
    ) -> BTreeMap<String, ImageHostingMeta> {
        self.image_hosting_services(catalog, locale)
            .into_iter()
            .map(|meta| (meta.meta.kind.clone(), meta))
            .collect()
    }

    /// Build a note service, or `None` when `kind` is not registered.
    pub fn service_factory(&self, kind: &str, config: &Value) -> Option<Box<dyn NoteService>> {
        self.services.get(kind).map(|r| (r.factory)(config))
    }

    /// Build an image host, or `None` when `kind` is not registered.
    pub fn image_hosting_service_factory(
        &self,
        kind: &str,
        config: &Value,
    ) -> Option<Box<dyn ImageHostingService>> {
        self.image_hosting.get(kind).map(|r| (r.factory)(config))
    }
}

/// Deterministic id for a provider configuration.
///
/// Same type and same config always give the same id. Object keys are
/// compared in sorted order, so key order in `config` is irrelevant.
pub fn stable_id(kind: &str, config: &Value) -> String {
    let name = format!("{kind}\u{0}{config}");
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
