// Shared helpers for replicated object integration tests
#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use orrery_common::{
    ClusterHandle, DirectChannel, MemberChangeEvent, MembershipListener, MessageBus,
    OBJECTS_CHANNEL,
};
use orrery_core::{ObjectInfo, ObjectListener, service::LocalMessageBus};

pub const LOCAL: &str = "http://10.0.0.1:8848";
pub const REMOTE: &str = "http://10.0.0.2:8848";

/// Install a fmt subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wire form of one node's snapshot
pub fn snapshot(node_url: &str, name: &str, value: Value, kind: Option<&str>) -> Value {
    let mut payload = json!({ "nodeURL": node_url, "name": name, "value": value });
    if let Some(kind) = kind {
        payload["kind"] = json!(kind);
    }
    payload
}

/// A push made through a direct channel
#[derive(Clone, Debug)]
pub struct Push {
    pub node_url: String,
    pub channel: String,
    pub payload: Value,
}

/// Cluster handle that records direct pushes instead of delivering them
pub struct RecordingCluster {
    url: String,
    bus: Arc<LocalMessageBus>,
    listeners: Mutex<Vec<Arc<dyn MembershipListener>>>,
    routable: AtomicBool,
    pushes: Arc<Mutex<Vec<Push>>>,
}

impl RecordingCluster {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            bus: Arc::new(LocalMessageBus::new()),
            listeners: Mutex::new(Vec::new()),
            routable: AtomicBool::new(true),
            pushes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn set_routable(&self, routable: bool) {
        self.routable.store(routable, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().clone()
    }

    pub fn push_count_to(&self, node_url: &str) -> usize {
        self.pushes
            .lock()
            .iter()
            .filter(|p| p.node_url == node_url)
            .count()
    }

    /// Deliver a payload as if it arrived from another node
    pub fn receive(&self, payload: Value) -> bool {
        self.bus.deliver(OBJECTS_CHANNEL, None, &payload)
    }

    pub fn member_left(&self, node_url: &str) {
        let event = MemberChangeEvent::member_leave(node_url);
        let listeners: Vec<_> = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_member_change(&event);
        }
    }
}

impl ClusterHandle for RecordingCluster {
    fn local_url(&self) -> &str {
        &self.url
    }

    fn message_bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    fn add_membership_listener(&self, listener: Arc<dyn MembershipListener>) {
        self.listeners.lock().push(listener);
    }

    fn remove_membership_listener(&self, listener: &Arc<dyn MembershipListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        listeners.len() != before
    }

    fn direct_channel(&self, node_url: &str) -> Option<Arc<dyn DirectChannel>> {
        if !self.routable.load(Ordering::SeqCst) {
            return None;
        }
        Some(Arc::new(RecordingChannel {
            node_url: node_url.to_string(),
            pushes: self.pushes.clone(),
        }))
    }

    fn observe_channel(&self, _channel: &str) {}
}

struct RecordingChannel {
    node_url: String,
    pushes: Arc<Mutex<Vec<Push>>>,
}

impl DirectChannel for RecordingChannel {
    fn node_url(&self) -> &str {
        &self.node_url
    }

    fn publish(&self, channel: &str, payload: Value) {
        self.pushes.lock().push(Push {
            node_url: self.node_url.clone(),
            channel: channel.to_string(),
            payload,
        });
    }
}

/// Counts notifications of any object type
#[derive(Default)]
pub struct Counting {
    updates: AtomicUsize,
    removals: AtomicUsize,
}

impl Counting {
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl<T> ObjectListener<T> for Counting {
    fn on_updated(&self, _: Option<&ObjectInfo<T>>, _: &ObjectInfo<T>) -> anyhow::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_removed(&self, _: &ObjectInfo<T>) -> anyhow::Result<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
