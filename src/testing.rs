//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, Semaphore, broadcast};

use crate::model::{Compatibility, Destination, ImageBlob, UserInfo};
use crate::platform::{
    ClipboardWriter, FileDownloader, ImageLoader, PlatformError, PlatformSet, PowerpackApi,
    RemoteConfig, RemoteConfigSource, TabBridge, TabCommand, TabSnapshot,
};
use crate::registry::{
    ImageHostingRegistration, ImageHostingService, LocalizedName, NoteService,
    NoteServiceRegistration, ProviderDescriptor, ProviderError, stable_id,
};
use crate::sandbox::{SandboxError, ToolHost};
use crate::storage::{MemoryStorage, StorageError, StorageGateway};

fn descriptor(kind: &str, family: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        kind: kind.into(),
        name: LocalizedName::new(format!("{family}.{kind}.name"), kind),
        icon: kind.to_lowercase(),
        home_page: format!("https://{kind}.example"),
    }
}

fn png(len: usize) -> ImageBlob {
    ImageBlob {
        mime_type: "image/png".into(),
        data: bytes::Bytes::from(vec![0u8; len]),
    }
}

// -- Providers --

/// Note service accepting only `{"token": "valid"}`.
struct FakeNote {
    kind: String,
    config: Value,
    gate: Option<Gate>,
}

#[async_trait]
impl NoteService for FakeNote {
    fn id(&self) -> String {
        stable_id(&self.kind, &self.config)
    }

    async fn verify(&self) -> Result<UserInfo, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if self.config.get("token").and_then(Value::as_str) != Some("valid") {
            return Err(ProviderError::Rejected("bad token".into()));
        }
        Ok(UserInfo {
            name: format!("{} user", self.kind),
            avatar: None,
            home_page: None,
            description: None,
        })
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>, ProviderError> {
        Ok(["inbox", "archive"]
            .iter()
            .map(|name| Destination {
                id: format!("{}/{name}", self.kind),
                name: name.to_string(),
                group_id: self.kind.clone(),
                group_name: self.kind.clone(),
            })
            .collect())
    }
}

pub fn fake_service(kind: &str) -> NoteServiceRegistration {
    let owned = kind.to_string();
    NoteServiceRegistration::new(descriptor(kind, "service"), move |config| {
        Box::new(FakeNote {
            kind: owned.clone(),
            config: config.clone(),
            gate: None,
        })
    })
}

/// Note service whose `verify` blocks until `gate` opens.
pub fn gated_service(kind: &str, gate: Gate) -> NoteServiceRegistration {
    let owned = kind.to_string();
    NoteServiceRegistration::new(descriptor(kind, "service"), move |config| {
        Box::new(FakeNote {
            kind: owned.clone(),
            config: config.clone(),
            gate: Some(gate.clone()),
        })
    })
}

/// Image host failing uploads when configured with `{"fail": true}`.
struct FakeImageHost {
    kind: String,
    config: Value,
}

#[async_trait]
impl ImageHostingService for FakeImageHost {
    fn id(&self) -> String {
        stable_id(&self.kind, &self.config)
    }

    async fn upload(&self, image: &ImageBlob) -> Result<String, ProviderError> {
        if self.config.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(ProviderError::Network("upload refused".into()));
        }
        Ok(format!("https://img.example/{}/{}", self.kind, image.data.len()))
    }
}

pub fn fake_image_hosting(kind: &str, support: Compatibility) -> ImageHostingRegistration {
    let owned = kind.to_string();
    ImageHostingRegistration::new(descriptor(kind, "imageHosting"), support, move |config| {
        Box::new(FakeImageHost {
            kind: owned.clone(),
            config: config.clone(),
        })
    })
}

/// Holds callers at a checkpoint until opened.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    open: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            open: Arc::new(Semaphore::new(0)),
        }
    }

    async fn pass(&self) {
        self.entered.notify_one();
        // Closed means open.
        let _ = self.open.acquire().await;
    }

    /// Resolve once some caller reached the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.open.close();
    }
}

// -- Storage --

/// Memory storage with per-key injected failures.
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            failing_writes: Mutex::new(HashSet::new()),
            failing_reads: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_writes_to(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_reads_of(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl StorageGateway for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        if self.failing_reads.lock().unwrap().contains(key) {
            return Err(StorageError::Unavailable(format!("read {key}")));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        if self.failing_writes.lock().unwrap().contains(key) {
            return Err(StorageError::Unavailable(format!("write {key}")));
        }
        self.inner.set(key, value).await
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.subscribe()
    }
}

/// Gateway that yields to the scheduler before every call, so
/// concurrent handlers interleave at each read and write.
pub struct YieldingStorage {
    inner: MemoryStorage,
}

impl YieldingStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageGateway for YieldingStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.subscribe()
    }
}

// -- Platform --

/// Tab recording every command. Commands at or after `fail_from`
/// fail.
#[derive(Default)]
pub struct FakeTab {
    current: Option<TabSnapshot>,
    run_output: Value,
    fail_from: Option<usize>,
    commands: Mutex<Vec<TabCommand>>,
    closed: AtomicBool,
}

impl FakeTab {
    pub fn with_run_output(output: Value) -> Self {
        Self {
            run_output: output,
            ..Self::default()
        }
    }

    pub fn with_current(title: &str, url: &str) -> Self {
        Self {
            current: Some(TabSnapshot {
                title: Some(title.into()),
                url: Some(url.into()),
            }),
            ..Self::default()
        }
    }

    pub fn failing_run() -> Self {
        Self {
            fail_from: Some(0),
            ..Self::default()
        }
    }

    /// First command answers `output`, every later one fails.
    pub fn failing_destroy(output: Value) -> Self {
        Self {
            run_output: output,
            fail_from: Some(1),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<TabCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabBridge for FakeTab {
    async fn current_tab(&self) -> Result<Option<TabSnapshot>, PlatformError> {
        Ok(self.current.clone())
    }

    async fn send(&self, command: TabCommand) -> Result<Value, PlatformError> {
        let index = {
            let mut commands = self.commands.lock().unwrap();
            commands.push(command);
            commands.len() - 1
        };
        match self.fail_from {
            Some(from) if index >= from => Err(PlatformError::Failed("script threw".into())),
            _ => Ok(self.run_output.clone()),
        }
    }

    async fn capture_visible_tab(&self) -> Result<ImageBlob, PlatformError> {
        Ok(png(4))
    }

    async fn close_current_tab(&self) -> Result<(), PlatformError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeClipboard {
    pub texts: Mutex<Vec<String>>,
}

#[async_trait]
impl ClipboardWriter for FakeClipboard {
    async fn write_text(&self, text: &str) -> Result<(), PlatformError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDownloads {
    pub files: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl FileDownloader for FakeDownloads {
    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), PlatformError> {
        self.files
            .lock()
            .unwrap()
            .push((file_name.to_string(), content.to_vec()));
        Ok(())
    }
}

/// Serves a 4 byte png for every URL.
pub struct FakeImages;

#[async_trait]
impl ImageLoader for FakeImages {
    async fn load(&self, _url: &str) -> Result<ImageBlob, PlatformError> {
        Ok(png(4))
    }
}

/// Accepts the access token `"good"`.
#[derive(Default)]
pub struct FakePowerpack {
    pub lookups: AtomicUsize,
}

#[async_trait]
impl PowerpackApi for FakePowerpack {
    async fn user_info(&self, access_token: &str) -> Result<UserInfo, PlatformError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if access_token != "good" {
            return Err(PlatformError::Http("401 Unauthorized".into()));
        }
        Ok(UserInfo {
            name: "powerpack user".into(),
            avatar: None,
            home_page: None,
            description: None,
        })
    }

    async fn ocr(&self, _access_token: &str, image: &ImageBlob) -> Result<String, PlatformError> {
        Ok(format!("recognized {} bytes", image.data.len()))
    }
}

pub const REMOTE_ICONFONT: &str = "https://cdn.example/remote-iconfont.js";

/// Remote config answering [`REMOTE_ICONFONT`], or failing like a 500.
#[derive(Default)]
pub struct FakeRemote {
    pub fail_config: AtomicBool,
    pub fail_iconfont: AtomicBool,
    pub config_fetches: AtomicUsize,
    pub scanned: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteConfigSource for FakeRemote {
    async fn fetch_config(&self) -> Result<RemoteConfig, PlatformError> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(PlatformError::Http("500 Internal Server Error".into()));
        }
        Ok(RemoteConfig {
            iconfont: REMOTE_ICONFONT.into(),
            icons: Vec::new(),
        })
    }

    async fn fetch_iconfont(&self, url: &str) -> Result<String, PlatformError> {
        self.scanned.lock().unwrap().push(url.to_string());
        if self.fail_iconfont.load(Ordering::SeqCst) {
            return Err(PlatformError::Http("404 Not Found".into()));
        }
        Ok(r#"<svg><symbol id="github"></symbol><symbol id="yuque"></symbol></svg>"#.into())
    }
}

/// Every fake adapter, kept around for assertions.
pub struct FakePlatform {
    pub tab: Arc<FakeTab>,
    pub clipboard: Arc<FakeClipboard>,
    pub downloads: Arc<FakeDownloads>,
    pub powerpack: Arc<FakePowerpack>,
    pub remote: Arc<FakeRemote>,
}

impl FakePlatform {
    pub fn new(tab: FakeTab) -> Self {
        Self {
            tab: Arc::new(tab),
            clipboard: Arc::default(),
            downloads: Arc::default(),
            powerpack: Arc::default(),
            remote: Arc::default(),
        }
    }

    pub fn set(&self) -> PlatformSet {
        PlatformSet {
            tab: self.tab.clone(),
            clipboard: self.clipboard.clone(),
            downloads: self.downloads.clone(),
            images: Arc::new(FakeImages),
            powerpack: self.powerpack.clone(),
            remote_config: self.remote.clone(),
        }
    }
}

// -- Sandbox host --

/// Tool host recording every side effect.
#[derive(Default)]
pub struct RecordingHost {
    notifications: Mutex<Vec<String>>,
    clipboard: Mutex<Vec<String>>,
    downloads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingHost {
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn clipboard(&self) -> Vec<String> {
        self.clipboard.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<(String, Vec<u8>)> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHost for RecordingHost {
    fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }

    fn has_image_service(&self) -> bool {
        false
    }

    async fn load_image(&self, _url: &str) -> Result<ImageBlob, SandboxError> {
        Ok(png(4))
    }

    async fn capture_visible_tab(&self) -> Result<ImageBlob, SandboxError> {
        Ok(png(4))
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), SandboxError> {
        self.clipboard.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.downloads
            .lock()
            .unwrap()
            .push((file_name.to_string(), content.to_vec()));
        Ok(())
    }

    async fn ocr(&self, image: &ImageBlob) -> Result<String, SandboxError> {
        Ok(format!("recognized {} bytes", image.data.len()))
    }

    async fn upload_image(&self, _image: &ImageBlob) -> Result<String, SandboxError> {
        Ok("https://img.example/a.png".into())
    }
}

/// Credentials the fake note services accept.
pub fn valid_credentials() -> Value {
    json!({"token": "valid"})
}
