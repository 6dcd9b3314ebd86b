//! Live-connection registry.
//!
//! The `connections` map is the authoritative owner of per-connection state;
//! `by_user` is a derived index for multi-device fanout and is kept in sync
//! under the same lock. Writes to a socket go through its unbounded queue, so
//! a slow recipient never stalls the sender; the heartbeat reclaims dead
//! sockets within one tick.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use palaver_shared::frames::close;
use palaver_shared::Frame;

/// Interval between liveness sweeps. A socket that misses a full interval
/// without a pong is terminated on the next sweep.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long an open connection may stay unauthenticated.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<WsMessage>,
    user_id: Option<Uuid>,
    alive: bool,
    auth_timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<Uuid, ConnectionEntry>,
    by_user: HashMap<Uuid, HashSet<Uuid>>,
}

impl HubInner {
    fn detach(&mut self, conn_id: Uuid) -> Option<Uuid> {
        let entry = self.connections.remove(&conn_id)?;
        if let Some(timer) = entry.auth_timer {
            timer.abort();
        }
        let user_id = entry.user_id?;
        if let Some(set) = self.by_user.get_mut(&user_id) {
            set.remove(&conn_id);
            if set.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
        Some(user_id)
    }
}

pub struct Hub {
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
        }
    }

    /// Register a freshly upgraded connection, not yet authenticated.
    pub async fn add(&self, conn_id: Uuid, tx: mpsc::UnboundedSender<WsMessage>) {
        let mut inner = self.inner.lock().await;
        inner.connections.insert(
            conn_id,
            ConnectionEntry {
                tx,
                user_id: None,
                alive: true,
                auth_timer: None,
            },
        );
    }

    /// Attach the auth-handshake timer to a connection. If the connection is
    /// already gone the timer is aborted immediately.
    pub async fn set_auth_timer(&self, conn_id: Uuid, timer: JoinHandle<()>) {
        let mut inner = self.inner.lock().await;
        match inner.connections.get_mut(&conn_id) {
            Some(entry) => entry.auth_timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Bind a connection to a user after a successful auth frame. Cancels the
    /// handshake timer. Returns false if the connection no longer exists.
    pub async fn authenticate(&self, conn_id: Uuid, user_id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.connections.get_mut(&conn_id) else {
            return false;
        };
        if let Some(timer) = entry.auth_timer.take() {
            timer.abort();
        }
        entry.user_id = Some(user_id);
        inner.by_user.entry(user_id).or_default().insert(conn_id);
        true
    }

    /// Drop a connection from both indices, returning the user it belonged
    /// to, if it was authenticated.
    pub async fn remove(&self, conn_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.lock().await;
        inner.detach(conn_id)
    }

    pub async fn is_authenticated(&self, conn_id: Uuid) -> bool {
        self.user_id_of(conn_id).await.is_some()
    }

    pub async fn user_id_of(&self, conn_id: Uuid) -> Option<Uuid> {
        let inner = self.inner.lock().await;
        inner.connections.get(&conn_id).and_then(|e| e.user_id)
    }

    pub async fn is_user_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        inner.by_user.contains_key(&user_id)
    }

    /// Queue a frame on every open socket of a user. Returns whether at least
    /// one write was accepted.
    pub async fn send_to_user(&self, user_id: Uuid, frame: &Frame) -> bool {
        let text = frame.to_json();
        let inner = self.inner.lock().await;
        let Some(conn_ids) = inner.by_user.get(&user_id) else {
            return false;
        };
        let mut delivered = false;
        for conn_id in conn_ids {
            if let Some(entry) = inner.connections.get(conn_id) {
                if entry.tx.send(WsMessage::Text(text.clone().into())).is_ok() {
                    delivered = true;
                }
            }
        }
        delivered
    }

    pub async fn send_to_conn(&self, conn_id: Uuid, frame: &Frame) -> bool {
        let inner = self.inner.lock().await;
        match inner.connections.get(&conn_id) {
            Some(entry) => entry
                .tx
                .send(WsMessage::Text(frame.to_json().into()))
                .is_ok(),
            None => false,
        }
    }

    /// Record an inbound pong.
    pub async fn mark_alive(&self, conn_id: Uuid) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.connections.get_mut(&conn_id) {
            entry.alive = true;
        }
    }

    /// One heartbeat tick: terminate every socket that missed the previous
    /// ping, then ping the rest. Returns the users whose connections were
    /// terminated, for presence follow-up.
    pub async fn sweep(&self) -> Vec<Uuid> {
        let mut inner = self.inner.lock().await;

        let stale: Vec<Uuid> = inner
            .connections
            .iter()
            .filter(|(_, entry)| !entry.alive)
            .map(|(id, _)| *id)
            .collect();

        let mut detached_users = Vec::new();
        for conn_id in stale {
            tracing::debug!(conn_id = %conn_id, "terminating unresponsive connection");
            if let Some(entry) = inner.connections.get(&conn_id) {
                let _ = entry.tx.send(WsMessage::Close(None));
            }
            if let Some(user_id) = inner.detach(conn_id) {
                detached_users.push(user_id);
            }
        }

        for entry in inner.connections.values_mut() {
            entry.alive = false;
            let _ = entry.tx.send(WsMessage::Ping(Bytes::new()));
        }

        detached_users
    }

    /// Close one connection with an application close code.
    pub async fn close_conn(&self, conn_id: Uuid, code: u16, reason: &str) -> Option<Uuid> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.connections.get(&conn_id) {
            let _ = entry.tx.send(WsMessage::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })));
        }
        inner.detach(conn_id)
    }

    /// Server shutdown: close every socket with 1001 and clear both indices.
    pub async fn close_all(&self) {
        let mut inner = self.inner.lock().await;
        for entry in inner.connections.values() {
            let _ = entry.tx.send(WsMessage::Close(Some(CloseFrame {
                code: close::GOING_AWAY,
                reason: "server shutting down".to_string().into(),
            })));
        }
        inner.connections.clear();
        inner.by_user.clear();
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    pub async fn online_user_count(&self) -> usize {
        self.inner.lock().await.by_user.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
