// Core configuration model
// Wraps the layered `config::Config` and exposes typed accessors with defaults

use orrery_common::{DEFAULT_SESSION_PREFIX, OBJECTS_CHANNEL};

/// Default capacity of the membership event broadcast queue
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 1024;

/// Largest accepted membership event queue capacity
pub const MAX_EVENT_QUEUE_SIZE: usize = 65536;

/// Application configuration wrapper
/// Provides access to configuration values for replicated objects
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            config: config::Config::default(),
        }
    }
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    /// Channel that carries object snapshots between nodes
    pub fn objects_channel(&self) -> String {
        self.config
            .get_string("orrery.objects.channel")
            .unwrap_or_else(|_| OBJECTS_CHANNEL.to_string())
    }

    /// Whether the objects channel survives having no subscribers (default: true)
    pub fn objects_channel_persistent(&self) -> bool {
        self.config
            .get_bool("orrery.objects.persistent-channel")
            .unwrap_or(true)
    }

    /// Prefix for the private sender session of each object
    pub fn objects_session_prefix(&self) -> String {
        self.config
            .get_string("orrery.objects.session-prefix")
            .unwrap_or_else(|_| DEFAULT_SESSION_PREFIX.to_string())
    }

    /// Capacity of the membership event broadcast queue (default: 1024)
    ///
    /// Values outside `1..=MAX_EVENT_QUEUE_SIZE` fall back to the default.
    pub fn member_event_queue_size(&self) -> usize {
        self.config
            .get_int("orrery.member.event-queue-size")
            .ok()
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| (1..=MAX_EVENT_QUEUE_SIZE).contains(size))
            .unwrap_or(DEFAULT_EVENT_QUEUE_SIZE)
    }
}
