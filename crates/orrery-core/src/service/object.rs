//! Replicated per-node named objects
//!
//! Every node holds one authoritative local value of a named object and a
//! snapshot of every other node's value. Snapshots travel over a shared
//! broadcast channel; the first time a node is heard from, the local snapshot
//! is pushed straight back to it marked `initial` so both sides converge
//! without a coordinator.

use std::sync::{Arc, Weak};

use dashmap::{DashMap, mapref::entry::Entry};
use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use orrery_api::{InfoKind, ObjectInfo};
use orrery_common::{
    ChannelListener, ClusterHandle, DEFAULT_SESSION_PREFIX, LocalSession, MemberChangeEvent,
    MemberChangeType, MembershipListener, MessageBus, OBJECTS_CHANNEL, OrreryError, Result,
};

use super::factory::ObjectFactory;
use super::listener::{ObjectListener, ObjectListeners};
use super::merge::MergeStrategy;
use crate::metrics::{
    OBJECT_INITIAL_PUSHES_TOTAL, OBJECT_MESSAGES_IGNORED_TOTAL, OBJECT_REMOVALS_TOTAL,
    OBJECT_UPDATES_TOTAL,
};
use crate::model::Configuration;

/// Replicated object configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectConfig {
    /// Broadcast channel carrying snapshots between nodes
    pub channel: String,
    /// Whether the channel is created persistent
    pub persistent_channel: bool,
    /// Prefix of the private sender session, followed by `.<name>`
    pub session_prefix: String,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            channel: OBJECTS_CHANNEL.to_string(),
            persistent_channel: true,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
        }
    }
}

impl ObjectConfig {
    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let channel = configuration.objects_channel();
        if channel.trim().is_empty() {
            return Err(OrreryError::ConfigError(
                "orrery.objects.channel must not be empty".to_string(),
            ));
        }
        let session_prefix = configuration.objects_session_prefix();
        if session_prefix.trim().is_empty() {
            return Err(OrreryError::ConfigError(
                "orrery.objects.session-prefix must not be empty".to_string(),
            ));
        }

        Ok(Self {
            channel,
            persistent_channel: configuration.objects_channel_persistent(),
            session_prefix,
        })
    }
}

/// A named object replicated across every node of a cluster.
///
/// Snapshots are keyed by node URL. The local entry always exists; a remote
/// entry appears when that node's snapshot is first received and disappears
/// when the node leaves.
pub struct ReplicatedObject<T> {
    cluster: Arc<dyn ClusterHandle>,
    bus: Arc<dyn MessageBus>,
    name: String,
    local_url: String,
    factory: Arc<dyn ObjectFactory<T>>,
    config: ObjectConfig,
    infos: DashMap<String, Arc<ObjectInfo<T>>>,
    listeners: ObjectListeners<T>,
    sender: LocalSession,
    channel_subscription: Arc<dyn ChannelListener>,
    member_subscription: Arc<dyn MembershipListener>,
}

impl<T> ReplicatedObject<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    /// Create the object with the default channel and session naming
    pub fn new<F>(
        cluster: Arc<dyn ClusterHandle>,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Arc<Self>>
    where
        F: ObjectFactory<T> + 'static,
    {
        Self::with_config(cluster, name, factory, ObjectConfig::default())
    }

    pub fn with_config<F>(
        cluster: Arc<dyn ClusterHandle>,
        name: impl Into<String>,
        factory: F,
        config: ObjectConfig,
    ) -> Result<Arc<Self>>
    where
        F: ObjectFactory<T> + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(OrreryError::invalid_argument("object name must not be empty"));
        }

        let local_url = cluster.local_url().to_string();
        let bus = cluster.message_bus();
        let factory: Arc<dyn ObjectFactory<T>> = Arc::new(factory);

        let local = factory.new_object(None)?;
        let infos = DashMap::new();
        infos.insert(
            local_url.clone(),
            Arc::new(ObjectInfo::new(local_url.clone(), name.clone(), local)),
        );

        let sender = bus.new_local_session(&format!("{}.{}", config.session_prefix, name));
        sender.handshake();

        let object = Arc::new_cyclic(|me: &Weak<Self>| {
            let subscription = Arc::new(ObjectSubscription { object: me.clone() });
            Self {
                cluster: cluster.clone(),
                bus: bus.clone(),
                listeners: ObjectListeners::new(name.clone()),
                name,
                local_url,
                factory,
                config,
                infos,
                sender,
                channel_subscription: subscription.clone(),
                member_subscription: subscription,
            }
        });

        cluster.add_membership_listener(object.member_subscription.clone());
        if bus.create_if_absent(&object.config.channel, object.config.persistent_channel) {
            debug!(
                node = %object.local_url,
                object = %object.name,
                "Created channel {}",
                object.config.channel
            );
        }
        bus.add_listener(&object.config.channel, object.channel_subscription.clone());
        cluster.observe_channel(&object.config.channel);

        debug!(node = %object.local_url, object = %object.name, "Replicated object created");
        Ok(object)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    pub fn factory(&self) -> &Arc<dyn ObjectFactory<T>> {
        &self.factory
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterHandle> {
        &self.cluster
    }

    pub fn config(&self) -> &ObjectConfig {
        &self.config
    }

    /// Session used as the sender of broadcasts made by [`share`](Self::share)
    pub fn local_session(&self) -> &LocalSession {
        &self.sender
    }

    /// Number of nodes with a snapshot, the local one included
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get_local(&self) -> Option<T> {
        self.get_remote(&self.local_url)
    }

    /// Replace the local value and notify listeners.
    ///
    /// Nothing is sent to other nodes until [`share`](Self::share) is called.
    pub fn set_local(&self, value: impl Into<Option<T>>) -> Result<()> {
        let value = value
            .into()
            .ok_or_else(|| OrreryError::invalid_argument("local value must not be absent"))?;

        let info = Arc::new(ObjectInfo::new(
            self.local_url.clone(),
            self.name.clone(),
            value,
        ));
        let previous = self.infos.insert(self.local_url.clone(), info.clone());
        counter!(OBJECT_UPDATES_TOTAL, "object" => self.name.clone()).increment(1);
        self.listeners.notify_updated(previous.as_deref(), &info);
        Ok(())
    }

    pub fn get_remote(&self, node_url: &str) -> Option<T> {
        self.get_info(node_url).map(|info| info.value().clone())
    }

    pub fn get_info(&self, node_url: &str) -> Option<Arc<ObjectInfo<T>>> {
        self.infos.get(node_url).map(|entry| entry.value().clone())
    }

    /// Merge every node's snapshot with the given strategy
    pub fn get<S>(&self, strategy: &S) -> S::Output
    where
        S: MergeStrategy<T> + ?Sized,
    {
        strategy.merge(&self.infos())
    }

    /// Broadcast the local snapshot to every node
    pub fn share(&self) -> Result<()> {
        let Some(local) = self.get_info(&self.local_url) else {
            return Ok(());
        };
        let payload = local.to_payload()?;
        debug!(node = %self.local_url, object = %self.name, "Sharing {}", local);
        self.bus.publish(&self.config.channel, &self.sender, payload);
        Ok(())
    }

    /// Snapshots of all nodes at the time of the call, in no particular order
    pub fn infos(&self) -> Vec<Arc<ObjectInfo<T>>> {
        self.infos.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Arc<ObjectInfo<T>>> {
        self.infos().into_iter()
    }

    pub fn add_listener(&self, listener: Arc<dyn ObjectListener<T>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ObjectListener<T>>) -> bool {
        self.listeners.remove(listener)
    }

    /// Handle a payload received on the objects channel.
    ///
    /// The payload is a single field set or an array of them. Each element is
    /// accepted only if it comes from another node and carries this object's
    /// name; anything else is skipped. Always returns `true` so the message
    /// keeps travelling to other subscribers.
    pub fn on_message(&self, payload: &Value) -> bool {
        match payload {
            Value::Object(fields) => self.on_fields(fields),
            Value::Array(elements) => elements
                .iter()
                .filter_map(Value::as_object)
                .fold(true, |result, fields| self.on_fields(fields) && result),
            _ => true,
        }
    }

    fn on_fields(&self, fields: &Map<String, Value>) -> bool {
        let node_url = orrery_api::field_str(fields, orrery_api::NODE_URL_FIELD);
        let name = orrery_api::field_str(fields, orrery_api::NAME_FIELD);
        if node_url == Some(self.local_url.as_str()) || name != Some(self.name.as_str()) {
            return true;
        }

        match ObjectInfo::from_fields(fields, |raw| self.factory.new_object(Some(raw))) {
            Ok(info) => self.on_object(info),
            Err(e) => {
                counter!(OBJECT_MESSAGES_IGNORED_TOTAL, "object" => self.name.clone()).increment(1);
                debug!(node = %self.local_url, object = %self.name, "Ignoring element: {}", e);
            }
        }
        true
    }

    fn on_object(&self, info: ObjectInfo<T>) {
        let node_url = info.node_url().to_string();
        let initial = info.is_initial();
        let info = Arc::new(info);
        debug!(node = %self.local_url, object = %self.name, "Received {} snapshot {}", info.kind(), info);

        let previous = if initial {
            match self.infos.entry(node_url.clone()) {
                Entry::Occupied(existing) => Some(existing.get().clone()),
                Entry::Vacant(vacant) => {
                    vacant.insert(info.clone());
                    None
                }
            }
        } else {
            self.infos.insert(node_url.clone(), info.clone())
        };

        if !(initial && previous.is_some()) {
            counter!(OBJECT_UPDATES_TOTAL, "object" => self.name.clone()).increment(1);
            self.listeners.notify_updated(previous.as_deref(), &info);
        }

        if previous.is_none() {
            self.push_local_to(&node_url);
        }
    }

    /// Send the local snapshot, marked `initial`, to a node seen for the first time
    fn push_local_to(&self, node_url: &str) {
        let Some(local) = self.get_info(&self.local_url) else {
            return;
        };
        let Some(channel) = self.cluster.direct_channel(node_url) else {
            let e = OrreryError::UnroutableNode(node_url.to_string());
            debug!(node = %self.local_url, object = %self.name, "Skipping initial push: {}", e);
            return;
        };

        let initial = (*local).clone().with_kind(InfoKind::Initial);
        match initial.to_payload() {
            Ok(payload) => {
                debug!(
                    node = %self.local_url,
                    object = %self.name,
                    "Pushing initial snapshot to {}",
                    channel.node_url()
                );
                channel.publish(&self.config.channel, payload);
                counter!(OBJECT_INITIAL_PUSHES_TOTAL, "object" => self.name.clone()).increment(1);
            }
            Err(e) => {
                debug!(node = %self.local_url, object = %self.name, "Skipping initial push: {}", e);
            }
        }
    }

    fn on_member_joined(&self, node_url: &str) {
        debug!(node = %self.local_url, object = %self.name, "Node joined: {}", node_url);
    }

    fn on_member_left(&self, node_url: &str) {
        if node_url == self.local_url {
            warn!(node = %self.local_url, object = %self.name, "Ignoring leave event for the local node");
            return;
        }

        let Some((_, removed)) = self.infos.remove(node_url) else {
            debug!(node = %self.local_url, object = %self.name, "Node left without a snapshot: {}", node_url);
            return;
        };
        counter!(OBJECT_REMOVALS_TOTAL, "object" => self.name.clone()).increment(1);
        debug!(node = %self.local_url, object = %self.name, "Node left, removed {}", removed);
        self.listeners.notify_removed(&removed);
    }
}

impl<'a, T> IntoIterator for &'a ReplicatedObject<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    type Item = Arc<ObjectInfo<T>>;
    type IntoIter = std::vec::IntoIter<Arc<ObjectInfo<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> std::fmt::Debug for ReplicatedObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedObject")
            .field("name", &self.name)
            .field("local_url", &self.local_url)
            .field("nodes", &self.infos.len())
            .field("listeners", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Drop for ReplicatedObject<T> {
    fn drop(&mut self) {
        self.bus
            .remove_listener(&self.config.channel, &self.channel_subscription);
        self.cluster
            .remove_membership_listener(&self.member_subscription);
        self.bus.remove_local_session(&self.sender);
        debug!(node = %self.local_url, object = %self.name, "Replicated object dropped");
    }
}

/// Registration handed to the cluster and the bus.
///
/// Holds the object weakly; once the object is dropped, events are ignored.
struct ObjectSubscription<T> {
    object: Weak<ReplicatedObject<T>>,
}

impl<T> MembershipListener for ObjectSubscription<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    fn on_member_change(&self, event: &MemberChangeEvent) {
        let Some(object) = self.object.upgrade() else {
            return;
        };
        match event.change_type {
            MemberChangeType::MemberJoin => object.on_member_joined(&event.node_url),
            MemberChangeType::MemberLeave => object.on_member_left(&event.node_url),
        }
    }
}

impl<T> ChannelListener for ObjectSubscription<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    fn on_message(&self, _from: Option<&LocalSession>, _channel: &str, payload: &Value) -> bool {
        self.object
            .upgrade()
            .is_none_or(|object| object.on_message(payload))
    }
}
