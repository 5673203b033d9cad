//! Snapshot cache: the last known server list, owned by the orchestrator.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::domain::{Server, ServerId};
use tracing::warn;

/// Immutable copy of the server list plus the message of the response that
/// produced it. Ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub servers: Vec<Server>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(servers: Vec<Server>, message: impl Into<String>) -> Self {
        Self {
            servers,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(Vec::new(), message)
    }

    pub fn ids(&self) -> Vec<ServerId> {
        self.servers.iter().map(|s| s.id).collect()
    }

    pub fn find(&self, id: ServerId) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced { index: usize },
    NotFound,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: Option<Snapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.current.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Installs a freshly listed collection. The directory returns oldest
    /// first, so the order is reversed once here.
    pub fn install(&mut self, mut servers: Vec<Server>, message: impl Into<String>) -> Snapshot {
        servers.reverse();
        let snapshot = Snapshot::new(dedup_by_id(servers), message);
        self.current = Some(snapshot.clone());
        snapshot
    }

    /// Replaces the entry with the same id in place. An unset cache becomes an
    /// empty snapshot; the entries are left alone when the id is not cached.
    pub fn replace_server(&mut self, server: Server, message: impl Into<String>) -> ReplaceOutcome {
        let message = message.into();
        let snapshot = self
            .current
            .get_or_insert_with(|| Snapshot::empty(message.clone()));
        let Some(index) = snapshot.servers.iter().position(|s| s.id == server.id) else {
            return ReplaceOutcome::NotFound;
        };
        snapshot.servers[index] = server;
        snapshot.message = message;
        snapshot.timestamp = Utc::now();
        ReplaceOutcome::Replaced { index }
    }

    pub fn prepend(&mut self, server: Server, message: impl Into<String>) -> Snapshot {
        let snapshot = self.current.get_or_insert_with(|| Snapshot::empty(""));
        if let Some(existing) = snapshot.servers.iter().position(|s| s.id == server.id) {
            warn!(server_id = server.id.0, "cache: new server id already cached, dropping stale entry");
            snapshot.servers.remove(existing);
        }
        snapshot.servers.insert(0, server);
        snapshot.message = message.into();
        snapshot.timestamp = Utc::now();
        snapshot.clone()
    }

    /// Removes every entry with `id`; a missing id only refreshes the message.
    pub fn remove(&mut self, id: ServerId, message: impl Into<String>) -> Snapshot {
        let snapshot = self.current.get_or_insert_with(|| Snapshot::empty(""));
        snapshot.servers.retain(|s| s.id != id);
        snapshot.message = message.into();
        snapshot.timestamp = Utc::now();
        snapshot.clone()
    }
}

fn dedup_by_id(servers: Vec<Server>) -> Vec<Server> {
    let mut seen = HashSet::with_capacity(servers.len());
    let total = servers.len();
    let unique: Vec<Server> = servers.into_iter().filter(|s| seen.insert(s.id)).collect();
    if unique.len() != total {
        warn!(
            dropped = total - unique.len(),
            "cache: directory listed duplicate server ids"
        );
    }
    unique
}
