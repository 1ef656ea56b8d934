//! Shared topic-building helper for the end-to-end scenario suite
//! (spec.md §8).

use std::sync::Arc;

use mofka::{Metadata, PolicySpec, Provider, ServiceHandle, ThreadPool, TopicHandle};

/// Builds a fresh `Provider` + topic named `"events"` with `partitions`
/// in-memory partitions and the given policy names, all defaulting to
/// `"default"` metadata-free configuration.
pub fn topic_with_policies(
    partitions: usize,
    validator: &str,
    selector: &str,
    serializer: &str,
) -> TopicHandle {
    let pool = ThreadPool::new(4).expect("thread pool");
    let provider = Arc::new(Provider::new(0, pool));
    let service = ServiceHandle::new(provider);
    service
        .create_topic(
            "events",
            PolicySpec::new(validator, Metadata::empty()),
            PolicySpec::new(selector, Metadata::empty()),
            PolicySpec::new(serializer, Metadata::empty()),
        )
        .expect("create_topic");
    for _ in 0..partitions {
        service.add_partition("events", "memory").expect("add_partition");
    }
    service.open_topic("events").expect("open_topic")
}

/// The common case: every policy left at its no-op default.
pub fn topic(partitions: usize) -> TopicHandle {
    topic_with_policies(partitions, "default", "default", "default")
}
