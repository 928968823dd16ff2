// Metrics for replicated objects
// Counters are labelled with the object name; no recorder is installed here

use metrics::describe_counter;

pub const OBJECT_UPDATES_TOTAL: &str = "object_updates_total";
pub const OBJECT_REMOVALS_TOTAL: &str = "object_removals_total";
pub const OBJECT_INITIAL_PUSHES_TOTAL: &str = "object_initial_pushes_total";
pub const OBJECT_LISTENER_FAILURES_TOTAL: &str = "object_listener_failures_total";
pub const OBJECT_MESSAGES_IGNORED_TOTAL: &str = "object_messages_ignored_total";

/// Initialize all metric descriptions
/// Should be called once at application startup, after installing a recorder
pub fn init_metrics() {
    describe_counter!(
        OBJECT_UPDATES_TOTAL,
        "Total number of accepted snapshot updates"
    );
    describe_counter!(
        OBJECT_REMOVALS_TOTAL,
        "Total number of snapshots removed because their node left"
    );
    describe_counter!(
        OBJECT_INITIAL_PUSHES_TOTAL,
        "Total number of local snapshots pushed to newly seen nodes"
    );
    describe_counter!(
        OBJECT_LISTENER_FAILURES_TOTAL,
        "Total number of listener invocations that failed"
    );
    describe_counter!(
        OBJECT_MESSAGES_IGNORED_TOTAL,
        "Total number of inbound payload elements that were malformed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_without_recorder() {
        // Descriptions are dropped when no recorder is installed
        init_metrics();
        metrics::counter!(OBJECT_UPDATES_TOTAL, "object" => "test").increment(1);
    }
}
