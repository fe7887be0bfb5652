// Session router (spec §4.1). Owns the in-memory half of session state:
// outbound frame channels per connected client and in-memory approval
// resolvers. The durable half (session rows, conversations, approval rows)
// lives in the store; this is the part that dies with the process.

use super::protocol::Frame;
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{ApprovalStatus, AuthorityTier, EventKind};
use crate::config::Config;
use crate::pipeline::executor::ApprovalCallback;
use crate::store::sessions::Session;
use crate::store::Store;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

pub enum BroadcastScope {
    Session(String),
    Channel(String),
    All,
}

struct Connection {
    channel: String,
    outbound: mpsc::UnboundedSender<Frame>,
}

/// Bound to one caller's connection; serializes `send` within a session to
/// satisfy the strict-FIFO fan-out rule (spec §4.1).
pub struct SessionRouter<'a> {
    store: &'a Store,
    cfg: &'a Config,
    connections: Mutex<HashMap<String, Connection>>,
    resolvers: Mutex<HashMap<String, oneshot::Sender<ApprovalStatus>>>,
    send_locks: Mutex<HashMap<String, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

impl<'a> SessionRouter<'a> {
    pub fn new(store: &'a Store, cfg: &'a Config) -> Self {
        SessionRouter {
            store,
            cfg,
            connections: Mutex::new(HashMap::new()),
            resolvers: Mutex::new(HashMap::new()),
            send_locks: Mutex::new(HashMap::new()),
        }
    }

    /// `connect(channel, user_id) -> session`: idempotent (spec §4.1).
    pub fn connect(&self, channel: &str, user_id: &str, outbound: mpsc::UnboundedSender<Frame>) -> CoreResult<Session> {
        let tier = self.cfg.authority.resolve(channel, user_id);
        let session = self.store.connect_session(channel, user_id, tier)?;
        self.connections
            .lock()
            .insert(session.session_id.clone(), Connection { channel: channel.to_string(), outbound });
        Ok(session)
    }

    /// A client disconnected: transport state is dropped, any pending
    /// approvals it alone could resolve are cancelled (spec §4.1 "Failure
    /// semantics").
    pub fn disconnect(&self, session_id: &str) -> CoreResult<()> {
        self.connections.lock().remove(session_id);
        for id in self.store.cancel_pending_approvals_for_session(session_id)? {
            if let Some(tx) = self.resolvers.lock().remove(&id) {
                let _ = tx.send(ApprovalStatus::Cancelled);
            }
        }
        Ok(())
    }

    fn session_lock(&self, session_id: &str) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        self.send_locks.lock().entry(session_id.to_string()).or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    /// Acquire the per-session FIFO lock around one enqueue/process cycle.
    /// Callers hold the guard for the duration of the turn they drive.
    pub async fn fifo_guard(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.session_lock(session_id).lock_owned().await
    }

    pub fn deliver(&self, session_id: &str, frame: Frame) -> CoreResult<()> {
        let connections = self.connections.lock();
        match connections.get(session_id) {
            Some(conn) => {
                let _ = conn.outbound.send(frame);
                Ok(())
            }
            None => Err(CoreError::Other(format!("session {session_id} has no connected client"))),
        }
    }

    /// `broadcast(event, scope)` (spec §4.1). Best-effort: missed events are
    /// not replayed, a disconnected target simply drops the frame.
    pub fn broadcast(&self, kind: EventKind, payload: serde_json::Value, scope: BroadcastScope) {
        let frame = Frame::event(kind, payload);
        let connections = self.connections.lock();
        match scope {
            BroadcastScope::Session(session_id) => {
                if let Some(conn) = connections.get(&session_id) {
                    let _ = conn.outbound.send(frame);
                }
            }
            BroadcastScope::Channel(channel) => {
                for conn in connections.values().filter(|c| c.channel == channel) {
                    let _ = conn.outbound.send(frame.clone());
                }
            }
            BroadcastScope::All => {
                for conn in connections.values() {
                    let _ = conn.outbound.send(frame.clone());
                }
            }
        }
    }

    fn register_resolver(&self, approval_id: &str) -> oneshot::Receiver<ApprovalStatus> {
        let (tx, rx) = oneshot::channel();
        self.resolvers.lock().insert(approval_id.to_string(), tx);
        rx
    }

    /// A client resolved an approval via an `approval_response` frame.
    /// Cross-channel resolution is permitted only when tiers match (spec
    /// §4.1); the caller is expected to have already checked that before
    /// calling this.
    pub fn resolve_in_memory(&self, approval_id: &str, decision: ApprovalStatus) {
        if let Some(tx) = self.resolvers.lock().remove(approval_id) {
            let _ = tx.send(decision);
        }
    }
}

/// Per-session approval callback: serializes an `approval_request` frame to
/// the originating session's client, registers a resolver, and awaits
/// resolution or timeout (spec §4.1).
pub struct GatewayApproval<'a> {
    pub router: &'a SessionRouter<'a>,
    pub store: &'a Store,
    pub session_id: String,
    pub timeout_secs: u64,
}

#[async_trait]
impl<'a> ApprovalCallback for GatewayApproval<'a> {
    async fn request_approval(&self, tool_name: &str, params: &serde_json::Value, context: &str) -> CoreResult<ApprovalStatus> {
        let req = self.store.create_approval(tool_name, params, context, &self.session_id, self.timeout_secs)?;
        let rx = self.router.register_resolver(&req.id);

        let redacted = params.clone();
        let frame = Frame::approval_request(&req.id, tool_name, &redacted, context, req.timeout_at);
        self.router.deliver(&self.session_id, frame)?;

        match tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), rx).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Ok(ApprovalStatus::Cancelled),
            Err(_) => {
                self.store.resolve_approval(&req.id, ApprovalStatus::Expired)?;
                Ok(ApprovalStatus::Expired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::AuthorityTier as Tier;

    #[test]
    fn connect_is_idempotent_for_same_identity() {
        let store = Store::open_in_memory().unwrap();
        let cfg = Config::default();
        let router = SessionRouter::new(&store, &cfg);
        let (tx, _rx) = mpsc::unbounded_channel();
        let s1 = router.connect("cli", "owner", tx.clone()).unwrap();
        let s2 = router.connect("cli", "owner", tx).unwrap();
        assert_eq!(s1.session_id, s2.session_id);
        assert_eq!(s1.authority_tier, Tier::Owner);
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_approvals_in_memory() {
        let store = Store::open_in_memory().unwrap();
        let cfg = Config::default();
        let router = SessionRouter::new(&store, &cfg);
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = router.connect("cli", "owner", tx).unwrap();

        let approval = GatewayApproval { router: &router, store: &store, session_id: session.session_id.clone(), timeout_secs: 3600 };
        let empty_args = serde_json::json!({});
        let fut = approval.request_approval("shell_execute", &empty_args, "ctx");
        tokio::pin!(fut);

        // give the request a tick to register its resolver, then disconnect
        tokio::task::yield_now().await;
        router.disconnect(&session.session_id).unwrap();

        let status = fut.await.unwrap();
        assert_eq!(status, ApprovalStatus::Cancelled);
    }
}
