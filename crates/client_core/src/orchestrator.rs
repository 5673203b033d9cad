//! State orchestrator: turns user actions into ordered application states.
//!
//! Every action gets a generation number and its own [`StateStream`], which
//! always yields an initial state (loading, or a replay of the cache) followed
//! by exactly one terminal state. The shared view returned by
//! [`StateOrchestrator::subscribe_view`] only follows the most recently issued
//! action; terminal states of superseded actions are kept off it.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use serde::Serialize;
use shared::{
    domain::{Server, ServerDraft},
    error::OperationError,
    protocol::DirectoryResponse,
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use crate::{
    cache::{ReplaceOutcome, Snapshot, SnapshotCache},
    config::Settings,
    directory::{DirectoryClient, DirectoryResult},
    filter::{evaluate, StatusFilter},
    tracker::{ActiveOperationTracker, OperationKey},
};

const SAVE_SUCCESS_MESSAGE: &str = "The server has been successfully added!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    Loading,
    Loaded(Snapshot),
    Error(OperationError),
}

impl ApplicationState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Loading => Phase::Loading,
            Self::Loaded(_) => Phase::Loaded,
            Self::Error(_) => Phase::Error,
        }
    }

    pub fn payload(&self) -> Option<&Snapshot> {
        match self {
            Self::Loaded(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// Transient user feedback; delivery is best effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
}

impl Notification {
    fn success(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            text: text.into(),
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Initialize,
    Ping,
    Save,
    Delete,
    Filter,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::Save => "save",
            Self::Delete => "delete",
            Self::Filter => "filter",
        }
    }
}

/// The ordered states of one action. Ends after the terminal state.
pub struct StateStream {
    generation: u64,
    inner: UnboundedReceiverStream<ApplicationState>,
}

impl StateStream {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Stream for StateStream {
    type Item = ApplicationState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

enum InitialState {
    Loading,
    ReplayCache,
}

struct Ticket {
    action: Action,
    generation: u64,
    key: Option<OperationKey>,
    tx: mpsc::UnboundedSender<ApplicationState>,
}

struct Resolution {
    snapshot: Snapshot,
    notification: Option<Notification>,
}

#[derive(Default)]
struct OrchestratorState {
    cache: SnapshotCache,
    tracker: ActiveOperationTracker,
    latest_generation: u64,
}

impl OrchestratorState {
    fn snapshot_or_empty(&self, message: &str) -> Snapshot {
        self.cache
            .current()
            .unwrap_or_else(|| Snapshot::empty(message))
    }
}

pub struct StateOrchestrator {
    directory: Arc<dyn DirectoryClient>,
    request_timeout: Duration,
    inner: Mutex<OrchestratorState>,
    view: watch::Sender<ApplicationState>,
    notifications: broadcast::Sender<Notification>,
}

impl StateOrchestrator {
    pub fn new(directory: Arc<dyn DirectoryClient>, settings: &Settings) -> Arc<Self> {
        let (view, _) = watch::channel(ApplicationState::Loading);
        let (notifications, _) = broadcast::channel(settings.notification_capacity.max(1));
        Arc::new(Self {
            directory,
            request_timeout: settings.request_timeout,
            inner: Mutex::new(OrchestratorState::default()),
            view,
            notifications,
        })
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ApplicationState> {
        self.view.subscribe()
    }

    pub fn current_view(&self) -> ApplicationState {
        self.view.borrow().clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.inner.lock().await.cache.current()
    }

    pub async fn active_ping(&self) -> Option<String> {
        self.inner.lock().await.tracker.active_ping()
    }

    pub async fn is_in_flight(&self, key: &OperationKey) -> bool {
        self.inner.lock().await.tracker.is_active(key)
    }

    pub async fn in_flight(&self) -> Vec<OperationKey> {
        self.inner.lock().await.tracker.in_flight()
    }

    /// Loads the full list and installs it newest first.
    pub async fn initialize(self: &Arc<Self>) -> StateStream {
        let (ticket, stream) = self
            .issue(Action::Initialize, |_| None, InitialState::Loading)
            .await;
        let directory = Arc::clone(&self.directory);
        self.spawn_resolution(
            ticket,
            async move { directory.list_servers().await },
            |cache, response| {
                let servers = response.require_servers()?;
                let snapshot = cache.install(servers, response.message);
                Ok(Resolution {
                    snapshot,
                    notification: None,
                })
            },
        );
        stream
    }

    pub async fn ping(self: &Arc<Self>, address: impl Into<String>) -> StateStream {
        let address = address.into();
        let (ticket, stream) = self
            .issue(
                Action::Ping,
                |_| Some(OperationKey::Ping(address.clone())),
                InitialState::ReplayCache,
            )
            .await;
        let directory = Arc::clone(&self.directory);
        self.spawn_resolution(
            ticket,
            async move { directory.ping_server(&address).await },
            |cache, response| {
                let server = response.require_server()?;
                let server_id = server.id;
                if cache.replace_server(server, response.message.clone())
                    == ReplaceOutcome::NotFound
                {
                    warn!(
                        server_id = server_id.0,
                        "orchestrator: pinged server is not cached, leaving entries unchanged"
                    );
                }
                Ok(Resolution {
                    snapshot: cache
                        .current()
                        .unwrap_or_else(|| Snapshot::empty(response.message.clone())),
                    notification: Some(Notification::success(response.message)),
                })
            },
        );
        stream
    }

    pub async fn save(self: &Arc<Self>, draft: ServerDraft) -> StateStream {
        let (ticket, stream) = self
            .issue(
                Action::Save,
                |generation| Some(OperationKey::Save(generation)),
                InitialState::ReplayCache,
            )
            .await;
        let directory = Arc::clone(&self.directory);
        self.spawn_resolution(
            ticket,
            async move { directory.create_server(&draft).await },
            |cache, response| {
                let server = response.require_server()?;
                Ok(Resolution {
                    snapshot: cache.prepend(server, response.message),
                    notification: Some(Notification::success(SAVE_SUCCESS_MESSAGE)),
                })
            },
        );
        stream
    }

    pub async fn delete_server(self: &Arc<Self>, server: &Server) -> StateStream {
        let id = server.id;
        let (ticket, stream) = self
            .issue(
                Action::Delete,
                |_| Some(OperationKey::Delete(id)),
                InitialState::ReplayCache,
            )
            .await;
        let directory = Arc::clone(&self.directory);
        self.spawn_resolution(
            ticket,
            async move { directory.delete_server(id).await },
            move |cache, response| {
                let notification = Notification::info(response.message.clone());
                Ok(Resolution {
                    snapshot: cache.remove(id, response.message),
                    notification: Some(notification),
                })
            },
        );
        stream
    }

    /// Derives a filtered view from the cache without replacing it.
    pub async fn filter(self: &Arc<Self>, selector: StatusFilter) -> StateStream {
        let (ticket, stream) = self
            .issue(Action::Filter, |_| None, InitialState::ReplayCache)
            .await;

        let mut inner = self.inner.lock().await;
        let source = inner.snapshot_or_empty("");
        let view = evaluate(selector, &source).into_snapshot(&source);
        info!(
            generation = ticket.generation,
            %selector,
            visible = view.servers.len(),
            "orchestrator: filter applied"
        );
        self.notify(Notification::info(view.message.clone()));
        self.finish(&mut inner, ticket, ApplicationState::Loaded(view));
        stream
    }

    /// `key` is built from the new generation so that operations without a
    /// natural target still get a slot of their own.
    async fn issue(
        &self,
        action: Action,
        key: impl FnOnce(u64) -> Option<OperationKey>,
        initial: InitialState,
    ) -> (Ticket, StateStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        inner.latest_generation += 1;
        let generation = inner.latest_generation;
        let key = key(generation);
        if let Some(key) = &key {
            inner.tracker.begin(key.clone(), generation);
        }

        let state = match initial {
            InitialState::Loading => ApplicationState::Loading,
            InitialState::ReplayCache => inner
                .cache
                .current()
                .map(ApplicationState::Loaded)
                .unwrap_or(ApplicationState::Loading),
        };
        info!(
            action = action.as_str(),
            generation,
            phase = ?state.phase(),
            "orchestrator: action issued"
        );
        // The receiver is still held by the stream being returned.
        let _ = tx.send(state.clone());
        self.view.send_replace(state);

        let ticket = Ticket {
            action,
            generation,
            key,
            tx,
        };
        let stream = StateStream {
            generation,
            inner: UnboundedReceiverStream::new(rx),
        };
        (ticket, stream)
    }

    fn spawn_resolution<Fut, Apply>(self: &Arc<Self>, ticket: Ticket, request: Fut, apply: Apply)
    where
        Fut: Future<Output = DirectoryResult> + Send + 'static,
        Apply: FnOnce(&mut SnapshotCache, DirectoryResponse) -> Result<Resolution, OperationError>
            + Send
            + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let timeout = this.request_timeout;
            let result = tokio::time::timeout(timeout, request)
                .await
                .unwrap_or_else(|_| Err(OperationError::timeout(timeout)));

            let mut inner = this.inner.lock().await;
            if let Some(key) = &ticket.key {
                inner.tracker.finish(key, ticket.generation);
            }

            // Applied against the cache as it is now, not as it was at issue time.
            let state = match result.and_then(|response| apply(&mut inner.cache, response)) {
                Ok(resolution) => {
                    info!(
                        action = ticket.action.as_str(),
                        generation = ticket.generation,
                        servers = resolution.snapshot.servers.len(),
                        "orchestrator: action resolved"
                    );
                    if let Some(notification) = resolution.notification {
                        this.notify(notification);
                    }
                    ApplicationState::Loaded(resolution.snapshot)
                }
                Err(err) => {
                    error!(
                        action = ticket.action.as_str(),
                        generation = ticket.generation,
                        status_code = err.status_code,
                        error = %err.message,
                        "orchestrator: action failed"
                    );
                    this.notify(Notification::error(err.to_string()));
                    ApplicationState::Error(err)
                }
            };
            this.finish(&mut inner, ticket, state);
        });
    }

    fn finish(&self, inner: &mut OrchestratorState, ticket: Ticket, state: ApplicationState) {
        if ticket.generation == inner.latest_generation {
            self.view.send_replace(state.clone());
        } else {
            warn!(
                action = ticket.action.as_str(),
                generation = ticket.generation,
                latest = inner.latest_generation,
                "orchestrator: superseded result kept off the view"
            );
        }
        // A dropped stream means the caller lost interest; the cache is already updated.
        let _ = ticket.tx.send(state);
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
