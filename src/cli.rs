use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast;

use clipper_prefs::config::StoreConfig;
use clipper_prefs::effects::{Level, Lifecycle, Notification};
use clipper_prefs::locale::{Catalog, changelog_url};
use clipper_prefs::platform::PlatformSet;
use clipper_prefs::registry::{RegistryError, ServiceRegistry};
use clipper_prefs::sandbox::ToolExtension;
use clipper_prefs::storage::{FileStorage, MemoryStorage, StorageError, StorageGateway};
use clipper_prefs::store::action::RunExtension;
use clipper_prefs::store::{self, Action, Deps, StoreError, StoreHandle};

/// Route the harness keeps its scratch clip data under.
const SCRATCH_ROUTE: &str = "/cli";

#[derive(Parser)]
#[command(name = "clipper-prefs", about = "Headless preference store harness")]
pub struct Cli {
    /// Storage file (MessagePack). In-memory when omitted.
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// Host serving config.json and the changelogs
    #[arg(long)]
    pub resource_host: Option<String>,

    /// Locale used when none is stored
    #[arg(long)]
    pub locale: Option<String>,

    /// Skip config.json and use the bundled iconfont
    #[arg(long)]
    pub offline: bool,

    /// Directory receiving downloaded files
    #[arg(long, default_value = ".")]
    pub download_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the store state after startup
    State,

    /// Persist the UI locale
    SetLocale { locale: String },

    /// Flip the editor line-number flag
    ToggleLineNumbers,

    /// Flip the editor live-rendering flag
    ToggleLiveRendering,

    /// Add an image host
    AddImageHosting {
        #[arg(long = "type")]
        kind: String,

        /// Provider configuration as JSON
        #[arg(long, default_value = "{}")]
        info: String,

        #[arg(long, default_value = "")]
        remark: String,
    },

    /// Evaluate a tool afterRun expression against clip data
    EvalScript {
        script: String,

        /// Clip data as JSON, bound to `data`
        #[arg(long, default_value = "null")]
        data: String,
    },

    /// Print the changelog URL for the current locale
    ChangelogUrl,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = StoreConfig::default();
    if let Some(host) = cli.resource_host {
        config.bundled_iconfont_url = format!("{}/iconfont.js", host.trim_end_matches('/'));
        config.resource_host = host;
    }
    if let Some(locale) = cli.locale {
        config.fallback_locale = locale;
    }
    config.fetch_remote_config = !cli.offline;

    let storage: Arc<dyn StorageGateway> = match &cli.storage {
        Some(path) => Arc::new(FileStorage::open(path).await?),
        None => Arc::new(MemoryStorage::new()),
    };
    let platform = PlatformSet::headless(&config, cli.download_dir);
    let deps = Deps::new(
        storage,
        ServiceRegistry::builtin()?,
        Arc::new(Catalog::new()),
        platform,
        config.clone(),
    );

    let store = store::start(deps).await?;
    let mut notes = store.subscribe_notifications();
    store.settled().await;

    let outcome = execute(&store, &mut notes, cli.command, &config).await;
    store.shutdown().await;
    outcome
}

async fn execute(
    store: &StoreHandle,
    notes: &mut broadcast::Receiver<Notification>,
    command: Command,
    config: &StoreConfig,
) -> Result<(), CliError> {
    match command {
        Command::State => {}
        Command::SetLocale { locale } => {
            settle(store, notes, Action::SetLocaleToStorage(Lifecycle::Started(locale))).await?;
        }
        Command::ToggleLineNumbers => {
            settle(store, notes, Action::SetShowLineNumber(Lifecycle::Started(()))).await?;
        }
        Command::ToggleLiveRendering => {
            settle(store, notes, Action::SetEditorLiveRendering(Lifecycle::Started(()))).await?;
        }
        Command::AddImageHosting { kind, info, remark } => {
            let form = store::action::ImageHostingForm {
                kind,
                info: serde_json::from_str(&info)?,
                remark,
            };
            settle(store, notes, Action::AddImageHosting(Lifecycle::Started(form))).await?;
        }
        Command::EvalScript { script, data } => {
            let data: Value = serde_json::from_str(&data)?;
            store.dispatch(Action::ChangeData {
                pathname: SCRATCH_ROUTE.into(),
                data,
            });
            let run = RunExtension {
                pathname: SCRATCH_ROUTE.into(),
                extension: ToolExtension {
                    id: "cli".into(),
                    after_run: Some(script),
                    ..ToolExtension::default()
                },
            };
            settle(store, notes, Action::RunExtension(Lifecycle::Started(run))).await?;
            let state = store.get_state();
            let result = state
                .clipper
                .clipper_data
                .get(SCRATCH_ROUTE)
                .cloned()
                .unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        Command::ChangelogUrl => {
            let locale = store.preference().locale;
            println!("{}", changelog_url(&config.resource_host, &locale));
            return Ok(());
        }
    }
    println!("{}", serde_json::to_string_pretty(&*store.get_state())?);
    Ok(())
}

/// Dispatch, wait for every handler, and fail on any error notification.
async fn settle(
    store: &StoreHandle,
    notes: &mut broadcast::Receiver<Notification>,
    action: Action,
) -> Result<(), CliError> {
    store.dispatch(action);
    store.settled().await;
    let mut failures = Vec::new();
    while let Ok(note) = notes.try_recv() {
        match note.level {
            Level::Error => failures.push(note.message),
            Level::Info | Level::Success => eprintln!("{}", note.message),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Failed(failures.join("; ")))
    }
}
