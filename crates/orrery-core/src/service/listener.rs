// Object change notification
// Delivers update and removal events to registered listeners in order

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use orrery_api::ObjectInfo;
use orrery_common::OrreryError;

use crate::metrics::OBJECT_LISTENER_FAILURES_TOTAL;

/// Observer of a replicated object's snapshots
///
/// Both methods default to doing nothing.
pub trait ObjectListener<T>: Send + Sync {
    /// A snapshot was stored; `old` is the snapshot it replaced, if any
    fn on_updated(&self, old: Option<&ObjectInfo<T>>, new: &ObjectInfo<T>) -> anyhow::Result<()> {
        let _ = (old, new);
        Ok(())
    }

    /// A node left and its snapshot was dropped
    fn on_removed(&self, info: &ObjectInfo<T>) -> anyhow::Result<()> {
        let _ = info;
        Ok(())
    }
}

type ListenerList<T> = Arc<Vec<Arc<dyn ObjectListener<T>>>>;

/// Copy-on-write listener registry.
///
/// Notification walks the list as it was when the event fired, so listeners
/// may be added or removed from any thread, including from inside a callback.
pub struct ObjectListeners<T> {
    object: String,
    listeners: RwLock<ListenerList<T>>,
}

impl<T> ObjectListeners<T> {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<dyn ObjectListener<T>>) {
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        debug!(object = %self.object, "Registered object listener, total: {}", guard.len());
    }

    /// Remove the first registration of `listener`. Returns whether one was found.
    pub fn remove(&self, listener: &Arc<dyn ObjectListener<T>>) -> bool {
        let mut guard = self.listeners.write();
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

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> ListenerList<T> {
        self.listeners.read().clone()
    }

    pub fn notify_updated(&self, old: Option<&ObjectInfo<T>>, new: &ObjectInfo<T>) {
        for listener in self.snapshot().iter() {
            self.invoke(|| listener.on_updated(old, new));
        }
    }

    pub fn notify_removed(&self, info: &ObjectInfo<T>) {
        for listener in self.snapshot().iter() {
            self.invoke(|| listener.on_removed(info));
        }
    }

    fn invoke<F>(&self, callback: F)
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let failure = match catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => OrreryError::ListenerFailure(format!("{:#}", e)),
            Err(panic) => OrreryError::ListenerFailure(panic_message(panic.as_ref())),
        };
        counter!(OBJECT_LISTENER_FAILURES_TOTAL, "object" => self.object.clone()).increment(1);
        info!(object = %self.object, "Exception while invoking listener: {}", failure);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// A listener that only logs what it sees
pub struct LoggingObjectListener;

impl<T: Serialize> ObjectListener<T> for LoggingObjectListener {
    fn on_updated(&self, old: Option<&ObjectInfo<T>>, new: &ObjectInfo<T>) -> anyhow::Result<()> {
        match old {
            Some(old) => info!("[ObjectEvent] Updated {} (was {})", new, old),
            None => info!("[ObjectEvent] Added {}", new),
        }
        Ok(())
    }

    fn on_removed(&self, info: &ObjectInfo<T>) -> anyhow::Result<()> {
        info!("[ObjectEvent] Removed {}", info);
        Ok(())
    }
}
