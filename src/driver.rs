//! Client-side topic directory: resolves topic names to partition
//! sets, creates Producers and Consumers (spec.md §4.6).

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::partition::PolicySnapshot;
use crate::policy::registry;
use crate::policy::{PartitionSelector, Serializer, Validator};
use crate::provider::{PartitionRef, Provider};
use crate::sched::ThreadPool;

/// Client-side entry point: creates and opens topics against a
/// `Provider`. Stands in for the reference implementation's
/// service-discovery-backed `ServiceHandle` — since the discovery file
/// format is out of scope (spec.md §1), a `ServiceHandle` here just
/// wraps the one in-process `Provider` it was built against.
#[derive(Clone)]
pub struct ServiceHandle {
    provider: Arc<Provider>,
}

impl ServiceHandle {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Arc<Provider> {
        self.provider.clone()
    }

    /// Registers `name` in the directory with the three policy
    /// metadata blobs; no partitions yet.
    pub fn create_topic(
        &self,
        name: &str,
        validator: crate::partition::PolicySpec,
        selector: crate::partition::PolicySpec,
        serializer: crate::partition::PolicySpec,
    ) -> Result<()> {
        self.provider.create_topic(
            name,
            PolicySnapshot {
                validator,
                selector,
                serializer,
            },
        )
    }

    /// Instantiates a PartitionManager of `kind` on this handle's
    /// provider and appends its UUID to the topic's partition list.
    pub fn add_partition(&self, topic: &str, kind: &str) -> Result<Uuid> {
        let entry = self.provider.open_topic(topic)?;
        let uuid = self.provider.create_partition(kind, entry.policy)?;
        self.provider.catalog().append_partition(
            topic,
            PartitionRef {
                uuid,
                address: "local".to_string(),
                provider_id: self.provider.id(),
            },
        )?;
        Ok(uuid)
    }

    /// Snapshots the partition list and policy metadata; instantiates
    /// local Validator/Selector/Serializer from the metadata.
    pub fn open_topic(&self, name: &str) -> Result<TopicHandle> {
        let entry = self.provider.open_topic(name)?;
        let validator =
            registry().create_validator(&entry.policy.validator.r#type, &entry.policy.validator.config)?;
        let selector =
            registry().create_selector(&entry.policy.selector.r#type, &entry.policy.selector.config)?;
        let serializer = registry()
            .create_serializer(&entry.policy.serializer.r#type, &entry.policy.serializer.config)?;
        selector.set_partitions(entry.partitions.len());
        Ok(TopicHandle {
            name: entry.name,
            provider: self.provider.clone(),
            partitions: entry.partitions,
            validator,
            selector,
            serializer,
        })
    }
}

/// A snapshot of one open topic: its partition list (fixed at open
/// time) plus the locally-instantiated policy trio.
#[derive(Clone)]
pub struct TopicHandle {
    name: String,
    provider: Arc<Provider>,
    partitions: Vec<PartitionRef>,
    validator: Arc<dyn Validator>,
    selector: Arc<dyn PartitionSelector>,
    serializer: Arc<dyn Serializer>,
}

impl TopicHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> &[PartitionRef] {
        &self.partitions
    }

    pub fn provider(&self) -> Arc<Provider> {
        self.provider.clone()
    }

    pub fn validator(&self) -> Arc<dyn Validator> {
        self.validator.clone()
    }

    pub fn selector(&self) -> Arc<dyn PartitionSelector> {
        self.selector.clone()
    }

    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone()
    }

    pub fn thread_pool_default() -> Result<ThreadPool> {
        ThreadPool::from_current().or_else(|_| ThreadPool::new(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PolicySpec;

    fn handle() -> ServiceHandle {
        let provider = Arc::new(Provider::new(0, ThreadPool::new(1).unwrap()));
        ServiceHandle::new(provider)
    }

    #[test]
    fn create_then_open_topic_resolves_default_policies() {
        let h = handle();
        h.create_topic(
            "events",
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
        )
        .unwrap();
        let topic = h.open_topic("events").unwrap();
        assert_eq!(topic.name(), "events");
        assert!(topic.partitions().is_empty());
    }

    #[test]
    fn add_partition_appends_to_topic_partition_list() {
        let h = handle();
        h.create_topic(
            "events",
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
        )
        .unwrap();
        h.add_partition("events", "memory").unwrap();
        h.add_partition("events", "memory").unwrap();
        let topic = h.open_topic("events").unwrap();
        assert_eq!(topic.partitions().len(), 2);
    }

    #[test]
    fn open_topic_with_unknown_policy_name_fails() {
        let h = handle();
        h.create_topic(
            "events",
            PolicySpec::new("no-such-validator", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
            PolicySpec::new("default", crate::metadata::Metadata::empty()),
        )
        .unwrap();
        assert!(h.open_topic("events").is_err());
    }
}
