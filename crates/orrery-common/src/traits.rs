//! Collaborator traits
//!
//! These traits describe everything a replicated object needs from the
//! surrounding cluster: who the local node is, how membership changes are
//! announced, how to publish on the shared channel, and how to reach one
//! specific node directly. Implementations live outside this crate; an
//! in-memory set ships with `orrery-core` for tests and embedding.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of member change event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberChangeType {
    /// A node joined the cluster
    MemberJoin,
    /// A node left the cluster
    MemberLeave,
}

impl std::fmt::Display for MemberChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberChangeType::MemberJoin => write!(f, "MEMBER_JOIN"),
            MemberChangeType::MemberLeave => write!(f, "MEMBER_LEAVE"),
        }
    }
}

/// Member change event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberChangeEvent {
    /// Type of change
    pub change_type: MemberChangeType,
    /// URL of the affected node
    #[serde(rename = "nodeURL")]
    pub node_url: String,
    /// Timestamp of the event in milliseconds
    pub timestamp: i64,
}

impl MemberChangeEvent {
    /// Create a new member join event
    pub fn member_join(node_url: impl Into<String>) -> Self {
        Self {
            change_type: MemberChangeType::MemberJoin,
            node_url: node_url.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a new member leave event
    pub fn member_leave(node_url: impl Into<String>) -> Self {
        Self {
            change_type: MemberChangeType::MemberLeave,
            node_url: node_url.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Observer of cluster membership changes
pub trait MembershipListener: Send + Sync {
    /// Called on the thread that detected the change
    fn on_member_change(&self, event: &MemberChangeEvent);
}

/// A sender identity on the local message bus
///
/// Clones share the same connection flag.
#[derive(Clone, Debug)]
pub struct LocalSession {
    id: String,
    connected: Arc<AtomicBool>,
}

impl LocalSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mark the session as connected so that its publishes are accepted
    pub fn handshake(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Whether both handles are clones of the same session
    pub fn shares_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.connected, &other.connected)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl PartialEq for LocalSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalSession {}

/// Receiver of messages published on a channel
pub trait ChannelListener: Send + Sync {
    /// Handle a payload published on `channel`.
    ///
    /// `from` is the local session that published it, or `None` when the
    /// payload arrived from another node.
    fn on_message(&self, from: Option<&LocalSession>, channel: &str, payload: &Value) -> bool;
}

/// The local publish/subscribe bus
pub trait MessageBus: Send + Sync {
    /// Create `channel` unless it already exists. Returns true if it was created.
    fn create_if_absent(&self, channel: &str, persistent: bool) -> bool;

    /// Subscribe `listener` to `channel`
    fn add_listener(&self, channel: &str, listener: Arc<dyn ChannelListener>);

    /// Unsubscribe the first registration of `listener` from `channel`
    fn remove_listener(&self, channel: &str, listener: &Arc<dyn ChannelListener>) -> bool;

    /// Create a sender identity; callers must handshake it before publishing
    fn new_local_session(&self, id: &str) -> LocalSession;

    /// Disconnect and forget a session created by `new_local_session`
    fn remove_local_session(&self, session: &LocalSession);

    /// Publish `payload` on `channel` as `from`
    fn publish(&self, channel: &str, from: &LocalSession, payload: Value);
}

/// Point-to-point route to one specific node
pub trait DirectChannel: Send + Sync {
    /// URL of the node this channel reaches
    fn node_url(&self) -> &str;

    /// Publish `payload` on `channel` at the remote node
    fn publish(&self, channel: &str, payload: Value);
}

/// Handle to the cluster this node participates in
pub trait ClusterHandle: Send + Sync {
    /// URL identifying the local node
    fn local_url(&self) -> &str;

    /// The local message bus
    fn message_bus(&self) -> Arc<dyn MessageBus>;

    /// Register an observer of membership changes
    fn add_membership_listener(&self, listener: Arc<dyn MembershipListener>);

    /// Remove the first registration of `listener`
    fn remove_membership_listener(&self, listener: &Arc<dyn MembershipListener>) -> bool;

    /// Direct channel to `node_url`, or `None` if the node is not reachable
    fn direct_channel(&self, node_url: &str) -> Option<Arc<dyn DirectChannel>>;

    /// Forward messages published locally on `channel` to every other node
    fn observe_channel(&self, channel: &str);
}
