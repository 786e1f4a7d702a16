//! Effect runtime - single-writer action loop with cooperative handlers.
//!
//! Architecture: channel-based actor. One loop task owns the state and
//! is the only writer. Actions arrive over an mpsc channel and are
//! processed strictly in order: the reducer runs first and the new
//! snapshot is published through a `watch` channel, then every matching
//! handler is started. Handlers are futures polled by the loop itself
//! (never spawned), so they interleave only where they await.
//!
//! The loop is biased toward the action queue: queued actions are
//! always reduced before any suspended handler is resumed, so a handler
//! waking up from `call` observes every action put before it resumed.
//!
//! Handlers are the error boundary. A handler returning `Err` is logged
//! and turned into an error [`Notification`]; the loop keeps going.

mod lifecycle;

pub use lifecycle::{Lifecycle, Phase};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::platform::PlatformError;
use crate::registry::ProviderError;
use crate::sandbox::SandboxError;
use crate::storage::StorageError;
use crate::verify::VerifyError;

/// How long shutdown waits for handlers to observe cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// State and action types driven by the runtime.
pub trait Model: Send + Sync + 'static {
    type State: Send + Sync + 'static;
    type Action: Clone + Send + Sync + fmt::Debug + 'static;

    /// Pure state transition. `None` when the action leaves state as is.
    fn reduce(state: &Self::State, action: &Self::Action) -> Option<Self::State>;

    fn action_name(action: &Self::Action) -> &'static str;

    fn action_phase(_action: &Self::Action) -> Option<Phase> {
        None
    }
}

/// Failure of an effect handler.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// The store was torn down while a `call` was pending.
    #[error("cancelled")]
    Cancelled,
    #[error("unsupported provider: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

type Task = BoxFuture<'static, ()>;
type Handler<M> =
    Box<dyn Fn(&<M as Model>::Action, &Effects<M>) -> Option<Task> + Send + Sync>;
type InitHook<M> =
    Box<dyn FnOnce(Effects<M>) -> BoxFuture<'static, Result<(), EffectError>> + Send>;

enum Command<M: Model> {
    Dispatch {
        action: M::Action,
        settled: Option<oneshot::Sender<()>>,
    },
    Watch(Task),
    Flush(oneshot::Sender<()>),
}

// -- Capability object --

/// What a handler may do: `call`, `put`, `select`, `notify`.
pub struct Effects<M: Model> {
    tx: mpsc::UnboundedSender<Command<M>>,
    state: watch::Receiver<Arc<M::State>>,
    notifications: broadcast::Sender<Notification>,
    token: CancellationToken,
}

impl<M: Model> Clone for Effects<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: self.state.clone(),
            notifications: self.notifications.clone(),
            token: self.token.clone(),
        }
    }
}

impl<M: Model> Effects<M> {
    /// Await an external effect. The only suspension point a handler
    /// has. Resolves to `Cancelled` once the store is shutting down.
    pub async fn call<F: Future>(&self, fut: F) -> Result<F::Output, EffectError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(EffectError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// `call` for fallible effects, flattening the error.
    pub async fn try_call<T, E, F>(&self, fut: F) -> Result<T, EffectError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EffectError>,
    {
        self.call(fut).await?.map_err(Into::into)
    }

    /// Enqueue an action. Never suspends.
    pub fn put(&self, action: M::Action) {
        let sent = self.tx.send(Command::Dispatch {
            action,
            settled: None,
        });
        if sent.is_err() {
            tracing::debug!("put after effect loop stopped");
        }
    }

    /// Enqueue an action and wait until every handler it triggered has
    /// finished.
    pub async fn put_and_settle(&self, action: M::Action) -> Result<(), EffectError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Dispatch {
                action,
                settled: Some(tx),
            })
            .map_err(|_| EffectError::Cancelled)?;
        self.call(rx).await?.map_err(|_| EffectError::Cancelled)
    }

    /// Read the current snapshot. Never suspends.
    pub fn select<T>(&self, selector: impl FnOnce(&M::State) -> T) -> T {
        let state = self.state.borrow();
        selector(&state)
    }

    pub fn snapshot(&self) -> Arc<M::State> {
        Arc::clone(&self.state.borrow())
    }

    pub fn notify(&self, notification: Notification) {
        tracing::debug!(level = ?notification.level, message = %notification.message, "notify");
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    /// Run a long-lived future on the loop. Watchers do not count as
    /// pending work for [`RuntimeHandle::settled`].
    pub fn spawn_watcher<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        let task = boundary(name, self.clone(), fut);
        if self.tx.send(Command::Watch(task)).is_err() {
            tracing::debug!(watcher = name, "watcher spawned after effect loop stopped");
        }
    }

    /// Answer a `Started` action: `Done` on success, `Failed` otherwise.
    ///
    /// The error is handed back so the handler boundary can report it.
    /// A cancelled outcome answers nothing.
    pub fn settle<P, R>(
        &self,
        params: P,
        outcome: Result<R, EffectError>,
        wrap: impl FnOnce(Lifecycle<P, R>) -> M::Action,
    ) -> Result<(), EffectError> {
        match outcome {
            Ok(result) => {
                self.put(wrap(Lifecycle::done(params, result)));
                Ok(())
            }
            Err(EffectError::Cancelled) => Err(EffectError::Cancelled),
            Err(e) => {
                self.put(wrap(Lifecycle::failed(params, &e)));
                Err(e)
            }
        }
    }
}

/// Convert a handler's result into logging and notifications.
fn boundary<M, F>(name: &'static str, fx: Effects<M>, fut: F) -> Task
where
    M: Model,
    F: Future<Output = Result<(), EffectError>> + Send + 'static,
{
    async move {
        match fut.await {
            Ok(()) => {}
            Err(EffectError::Cancelled) => tracing::debug!(handler = name, "handler cancelled"),
            Err(e) => {
                tracing::warn!(handler = name, error = %e, "handler failed");
                fx.notify(Notification::error(e.to_string()));
            }
        }
    }
    .boxed()
}

// -- Builder --

/// Handler and init-hook registrations, frozen by [`Runtime::start`].
pub struct Runtime<M: Model> {
    handlers: Vec<Handler<M>>,
    init: Vec<(&'static str, InitHook<M>)>,
}

impl<M: Model> Default for Runtime<M> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            init: Vec::new(),
        }
    }
}

impl<M: Model> Runtime<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler` once per dispatched action that `extract` accepts.
    ///
    /// Every match starts a new, independent run; earlier runs still in
    /// flight are not cancelled.
    pub fn take_every<P, X, F, Fut>(mut self, name: &'static str, extract: X, handler: F) -> Self
    where
        P: Send + 'static,
        X: Fn(&M::Action) -> Option<P> + Send + Sync + 'static,
        F: Fn(P, Effects<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        self.handlers.push(Box::new(move |action: &M::Action, fx: &Effects<M>| {
            let params = extract(action)?;
            Some(boundary(name, fx.clone(), handler(params, fx.clone())))
        }));
        self
    }

    /// Run `hook` once at startup. Hooks run one after another in
    /// registration order; the first error aborts the rest.
    pub fn on_init<F, Fut>(mut self, name: &'static str, hook: F) -> Self
    where
        F: FnOnce(Effects<M>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        self.init.push((name, Box::new(move |fx: Effects<M>| hook(fx).boxed())));
        self
    }

    /// Spawn the loop with `initial` state.
    ///
    /// The returned receiver resolves once every init hook has run, or
    /// with the first init error.
    pub fn start(
        self,
        initial: M::State,
        notification_capacity: usize,
    ) -> (RuntimeHandle<M>, oneshot::Receiver<Result<(), EffectError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(initial));
        let (notifications, _) = broadcast::channel(notification_capacity.max(1));
        let token = CancellationToken::new();
        let fx = Effects {
            tx,
            state: state_rx,
            notifications,
            token: token.clone(),
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let init = init_sequence(self.init, fx.clone(), ready_tx).boxed();

        let event_loop = EventLoop {
            handlers: self.handlers,
            state: state_tx,
            fx: fx.clone(),
        };
        let join = tokio::spawn(event_loop.run(rx, init, token));
        tracing::info!("effect loop started");

        (RuntimeHandle { fx, join }, ready_rx)
    }
}

async fn init_sequence<M: Model>(
    hooks: Vec<(&'static str, InitHook<M>)>,
    fx: Effects<M>,
    ready: oneshot::Sender<Result<(), EffectError>>,
) {
    for (name, hook) in hooks {
        tracing::debug!(hook = name, "running init hook");
        if let Err(e) = hook(fx.clone()).await {
            tracing::warn!(hook = name, error = %e, "init hook failed");
            let _ = ready.send(Err(e));
            return;
        }
    }
    let _ = ready.send(Ok(()));
}

// -- Loop --

struct EventLoop<M: Model> {
    handlers: Vec<Handler<M>>,
    state: watch::Sender<Arc<M::State>>,
    fx: Effects<M>,
}

impl<M: Model> EventLoop<M> {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<Command<M>>,
        init: Task,
        token: CancellationToken,
    ) {
        let mut tasks: FuturesUnordered<Task> = FuturesUnordered::new();
        let mut watchers: FuturesUnordered<Task> = FuturesUnordered::new();
        let mut flush_waiters: Vec<oneshot::Sender<()>> = Vec::new();
        tasks.push(init);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                // -- Queued command --
                Some(cmd) = rx.recv() => {
                    match cmd {
                        Command::Dispatch { action, settled } => {
                            let triggered = self.dispatch(&action);
                            match settled {
                                None => tasks.extend(triggered),
                                Some(done) => tasks.push(
                                    async move {
                                        join_all(triggered).await;
                                        let _ = done.send(());
                                    }
                                    .boxed(),
                                ),
                            }
                        }
                        Command::Watch(task) => watchers.push(task),
                        Command::Flush(waiter) => flush_waiters.push(waiter),
                    }
                }

                // -- Handler progress --
                Some(()) = tasks.next(), if !tasks.is_empty() => {}
                Some(()) = watchers.next(), if !watchers.is_empty() => {}
            }

            if tasks.is_empty() && rx.is_empty() {
                for waiter in flush_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
        }

        // Pending `call`s resolve to `Cancelled` now; let handlers see it.
        if !tasks.is_empty() {
            let pending = tasks.len();
            let drain = async { while tasks.next().await.is_some() {} };
            if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
                tracing::warn!(pending, "handlers still running at shutdown");
            }
        }
        tracing::info!("effect loop stopped");
    }

    /// Reduce, publish, and start the matching handlers.
    fn dispatch(&self, action: &M::Action) -> Vec<Task> {
        tracing::debug!(
            action = M::action_name(action),
            phase = M::action_phase(action).map(Phase::as_str).unwrap_or("-"),
            "dispatch"
        );
        let current = Arc::clone(&self.state.borrow());
        if let Some(next) = M::reduce(&current, action) {
            self.state.send_replace(Arc::new(next));
        }
        self.handlers
            .iter()
            .filter_map(|handler| handler(action, &self.fx))
            .collect()
    }
}

// -- Handle --

pub struct RuntimeHandle<M: Model> {
    fx: Effects<M>,
    join: JoinHandle<()>,
}

impl<M: Model> RuntimeHandle<M> {
    pub fn state(&self) -> Arc<M::State> {
        self.fx.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Arc<M::State>> {
        self.fx.state.clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.fx.notifications.subscribe()
    }

    pub fn dispatch(&self, action: M::Action) {
        self.fx.put(action);
    }

    pub fn effects(&self) -> Effects<M> {
        self.fx.clone()
    }

    /// Resolve once no action is queued and no handler is running.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        if self.fx.tx.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Resolve with the first snapshot satisfying `predicate`, or the
    /// last snapshot if the loop stops first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&M::State) -> bool,
    ) -> Arc<M::State> {
        let mut rx = self.fx.state.clone();
        match rx.wait_for(|state| predicate(state)).await {
            Ok(state) => Arc::clone(&state),
            Err(_) => self.state(),
        }
    }

    /// Cancel pending effects and stop the loop.
    pub async fn shutdown(self) {
        self.fx.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "effect loop panicked");
        }
    }
}
