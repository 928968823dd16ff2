// In-process cluster collaborators
// Lets several nodes live in one process: each node owns a message bus, peers
// are linked directly and observed channels are forwarded between them

use std::sync::{Arc, Weak};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use orrery_common::{
    ChannelListener, ClusterHandle, DirectChannel, LocalSession, MemberChangeEvent,
    MembershipListener, MessageBus,
};

use super::member_event::MemberChangeEventPublisher;
use crate::model::Configuration;

type ChannelListeners = Arc<Vec<Arc<dyn ChannelListener>>>;

struct ServerChannel {
    persistent: bool,
    listeners: RwLock<ChannelListeners>,
}

impl ServerChannel {
    fn new(persistent: bool) -> Self {
        Self {
            persistent,
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

/// Message bus of a single node.
///
/// Delivery is synchronous on the publishing thread, in subscription order.
#[derive(Default)]
pub struct LocalMessageBus {
    channels: DashMap<String, Arc<ServerChannel>>,
    sessions: DashMap<String, LocalSession>,
}

impl LocalMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_persistent(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|c| c.value().persistent)
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn session(&self, id: &str) -> Option<LocalSession> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |c| c.value().listeners.read().len())
    }

    /// Hand a payload to every subscriber of `channel`.
    ///
    /// `from` is `None` for messages that arrived from another node. Returns
    /// whether every subscriber accepted the message.
    pub fn deliver(&self, channel: &str, from: Option<&LocalSession>, payload: &Value) -> bool {
        let Some(server_channel) = self.channels.get(channel).map(|c| c.value().clone()) else {
            debug!("No channel {}, dropping message", channel);
            return false;
        };

        let listeners = server_channel.listeners.read().clone();
        listeners
            .iter()
            .fold(true, |result, l| l.on_message(from, channel, payload) && result)
    }

    fn channel(&self, channel: &str, persistent: bool) -> (Arc<ServerChannel>, bool) {
        match self.channels.entry(channel.to_string()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(vacant) => {
                let created = Arc::new(ServerChannel::new(persistent));
                vacant.insert(created.clone());
                (created, true)
            }
        }
    }
}

impl MessageBus for LocalMessageBus {
    fn create_if_absent(&self, channel: &str, persistent: bool) -> bool {
        self.channel(channel, persistent).1
    }

    fn add_listener(&self, channel: &str, listener: Arc<dyn ChannelListener>) {
        let (server_channel, _) = self.channel(channel, false);
        let mut guard = server_channel.listeners.write();
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.push(listener);
        *guard = Arc::new(next);
    }

    fn remove_listener(&self, channel: &str, listener: &Arc<dyn ChannelListener>) -> bool {
        let Some(server_channel) = self.channels.get(channel).map(|c| c.value().clone()) else {
            return false;
        };
        let mut guard = server_channel.listeners.write();
        let Some(position) = guard
            .iter()
            .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        else {
            return false;
        };
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.remove(position);
        *guard = Arc::new(next);
        true
    }

    fn new_local_session(&self, id: &str) -> LocalSession {
        let session = LocalSession::new(id);
        self.sessions.insert(id.to_string(), session.clone());
        session
    }

    fn remove_local_session(&self, session: &LocalSession) {
        session.disconnect();
        self.sessions
            .remove_if(session.id(), |_, known| known.shares_connection(session));
    }

    fn publish(&self, channel: &str, from: &LocalSession, payload: Value) {
        if !from.is_connected() {
            debug!("Session {} is not connected, dropping message", from.id());
            return;
        }
        self.deliver(channel, Some(from), &payload);
    }
}

/// Point-to-point link to one peer's bus
pub struct PeerChannel {
    node_url: String,
    target: Arc<LocalMessageBus>,
}

impl DirectChannel for PeerChannel {
    fn node_url(&self) -> &str {
        &self.node_url
    }

    fn publish(&self, channel: &str, payload: Value) {
        self.target.deliver(channel, None, &payload);
    }
}

/// Relays locally published messages of an observed channel to every peer
struct ChannelForwarder {
    cluster: Weak<LocalCluster>,
}

impl ChannelListener for ChannelForwarder {
    fn on_message(&self, from: Option<&LocalSession>, channel: &str, payload: &Value) -> bool {
        // Remote messages are never relayed again
        if from.is_none() {
            return true;
        }
        let Some(cluster) = self.cluster.upgrade() else {
            return true;
        };
        for peer in cluster.connected_peers() {
            peer.bus.deliver(channel, None, payload);
        }
        true
    }
}

/// One node of an in-process cluster
pub struct LocalCluster {
    me: Weak<LocalCluster>,
    url: String,
    bus: Arc<LocalMessageBus>,
    events: MemberChangeEventPublisher,
    peers: DashMap<String, Weak<LocalCluster>>,
    observed: DashSet<String>,
}

impl LocalCluster {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Self::with_configuration(url, &Configuration::default())
    }

    pub fn with_configuration(url: impl Into<String>, configuration: &Configuration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            url: url.into(),
            bus: Arc::new(LocalMessageBus::new()),
            events: MemberChangeEventPublisher::new(configuration.member_event_queue_size()),
            peers: DashMap::new(),
            observed: DashSet::new(),
        })
    }

    pub fn bus(&self) -> &Arc<LocalMessageBus> {
        &self.bus
    }

    /// URLs of the nodes this one is linked to
    pub fn peers(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.key().clone()).collect()
    }

    fn connected_peers(&self) -> Vec<Arc<LocalCluster>> {
        self.peers.iter().filter_map(|p| p.value().upgrade()).collect()
    }

    /// Link two nodes and let each observe the other joining
    pub fn connect(&self, other: &Arc<LocalCluster>) {
        if other.url == self.url || self.peers.contains_key(&other.url) {
            return;
        }
        self.peers.insert(other.url.clone(), Arc::downgrade(other));
        other.peers.insert(self.url.clone(), self.me.clone());
        info!("Node {} connected to {}", self.url, other.url);

        self.publish_member_event(MemberChangeEvent::member_join(other.url.clone()));
        other.publish_member_event(MemberChangeEvent::member_join(self.url.clone()));
    }

    /// Unlink two nodes and let each observe the other leaving
    pub fn disconnect(&self, other: &LocalCluster) {
        let removed = self.peers.remove(&other.url).is_some();
        let removed_back = other.peers.remove(&self.url).is_some();
        if removed || removed_back {
            info!("Node {} disconnected from {}", self.url, other.url);
        }
        if removed {
            self.publish_member_event(MemberChangeEvent::member_leave(other.url.clone()));
        }
        if removed_back {
            other.publish_member_event(MemberChangeEvent::member_leave(self.url.clone()));
        }
    }

    /// Disconnect from every peer
    pub fn leave(&self) {
        for peer in self.connected_peers() {
            self.disconnect(&peer);
        }
        self.peers.clear();
    }

    pub fn publish_member_event(&self, event: MemberChangeEvent) {
        self.events.publish(event);
    }

    pub fn subscribe_members(&self) -> broadcast::Receiver<MemberChangeEvent> {
        self.events.subscribe()
    }

    pub fn membership_listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

impl ClusterHandle for LocalCluster {
    fn local_url(&self) -> &str {
        &self.url
    }

    fn message_bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    fn add_membership_listener(&self, listener: Arc<dyn MembershipListener>) {
        self.events.register_listener(listener);
    }

    fn remove_membership_listener(&self, listener: &Arc<dyn MembershipListener>) -> bool {
        self.events.unregister_listener(listener)
    }

    fn direct_channel(&self, node_url: &str) -> Option<Arc<dyn DirectChannel>> {
        let peer = self.peers.get(node_url)?.value().upgrade()?;
        Some(Arc::new(PeerChannel {
            node_url: peer.url.clone(),
            target: peer.bus.clone(),
        }))
    }

    fn observe_channel(&self, channel: &str) {
        if !self.observed.insert(channel.to_string()) {
            return;
        }
        self.bus.add_listener(
            channel,
            Arc::new(ChannelForwarder {
                cluster: self.me.clone(),
            }),
        );
        debug!("Node {} observing channel {}", self.url, channel);
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("url", &self.url)
            .field("peers", &self.peers())
            .finish()
    }
}
