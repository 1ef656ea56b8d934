//! Network-addressable container for a process's PartitionManagers,
//! multiplexing by partition UUID, plus the in-process topic directory
//! (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::batching::BatchSize;
use crate::descriptor::DataDescriptor;
use crate::error::{MofkaError, Result};
use crate::partition::{ConsumerHandle, EventId, MemoryPartitionManager, PartitionManager, PolicySnapshot};
use crate::sched::ThreadPool;
use crate::store::MemoryDataStore;
use crate::transport::{BatchPayload, BulkRef};

/// One partition's directory entry (spec.md §6 "Topic catalogue
/// entry"). `address`/`provider_id` are vestigial here — there's only
/// one in-process Provider — but kept to mirror the wire shape a real
/// multi-server deployment would persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRef {
    pub uuid: Uuid,
    pub address: String,
    pub provider_id: u16,
}

/// A topic's directory entry: its policy metadata and ordered
/// partition list (spec.md §3 Topic entity).
#[derive(Debug, Clone)]
pub struct TopicEntry {
    pub name: String,
    pub policy: PolicySnapshot,
    pub partitions: Vec<PartitionRef>,
}

/// In-process stand-in for Mofka's external service-discovery file
/// (out of scope per spec.md §1): the directory of topics, their
/// policy metadata, and their partition lists.
///
/// Grounded the same way `AppState` in the teacher
/// (`synap-server/src/server/handlers.rs`) holds its store registry
/// behind a lock shared across handlers.
#[derive(Default)]
pub struct TopicCatalog {
    topics: RwLock<HashMap<String, TopicEntry>>,
}

impl TopicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, name: &str, policy: PolicySnapshot) -> Result<()> {
        let mut topics = self.topics.write();
        if topics.contains_key(name) {
            return Err(MofkaError::Protocol(format!("topic already exists: {name}")));
        }
        topics.insert(
            name.to_string(),
            TopicEntry {
                name: name.to_string(),
                policy,
                partitions: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn append_partition(&self, topic: &str, partition: PartitionRef) -> Result<()> {
        let mut topics = self.topics.write();
        let entry = topics
            .get_mut(topic)
            .ok_or_else(|| MofkaError::UnknownTopic(topic.to_string()))?;
        entry.partitions.push(partition);
        Ok(())
    }

    pub fn get(&self, topic: &str) -> Result<TopicEntry> {
        self.topics
            .read()
            .get(topic)
            .cloned()
            .ok_or_else(|| MofkaError::UnknownTopic(topic.to_string()))
    }

    pub fn destroy_topic(&self, topic: &str) -> Result<TopicEntry> {
        self.topics
            .write()
            .remove(topic)
            .ok_or_else(|| MofkaError::UnknownTopic(topic.to_string()))
    }
}

/// A network-addressable host for one or more PartitionManagers
/// (spec.md §4.5). Dispatches every RPC by partition UUID; holds no
/// state mutated on the hot path beyond the partition map itself.
pub struct Provider {
    id: u16,
    partitions: RwLock<HashMap<Uuid, Arc<dyn PartitionManager>>>,
    catalog: TopicCatalog,
    pool: ThreadPool,
}

impl Provider {
    pub fn new(id: u16, pool: ThreadPool) -> Self {
        Self {
            id,
            partitions: RwLock::new(HashMap::new()),
            catalog: TopicCatalog::new(),
            pool,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Instantiates a PartitionManager of `kind` ("memory" or
    /// "default" both resolve to the in-memory reference
    /// implementation — the only backend this crate ships) and
    /// registers it under a fresh UUID.
    pub fn create_partition(&self, kind: &str, policy: PolicySnapshot) -> Result<Uuid> {
        if kind != "memory" && kind != "default" {
            return Err(MofkaError::UnknownPlugin(format!("partition_manager:{kind}")));
        }
        let id = Uuid::new_v4();
        let manager: Arc<dyn PartitionManager> = Arc::new(MemoryPartitionManager::new(
            id,
            Arc::new(MemoryDataStore::new()),
            policy,
            crate::config::PartitionManagerConfig::default(),
        ));
        self.partitions.write().insert(id, manager);
        info!(provider = self.id, partition = %id, kind, "partition created");
        Ok(id)
    }

    fn partition(&self, uuid: Uuid) -> Result<Arc<dyn PartitionManager>> {
        self.partitions
            .read()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| MofkaError::UnknownPartition(uuid.to_string()))
    }

    pub async fn producer_store_data(
        &self,
        uuid: Uuid,
        sizes: &[usize],
        data: &[u8],
    ) -> Result<Vec<DataDescriptor>> {
        self.partition(uuid)?.store_data(sizes, data).await
    }

    pub async fn producer_send_batch(
        &self,
        uuid: Uuid,
        producer_name: &str,
        payload: BatchPayload,
    ) -> Result<EventId> {
        self.partition(uuid)?.receive_batch(producer_name, payload).await
    }

    /// Accepts a subscription and spawns its feed loop onto this
    /// provider's thread pool, returning once the loop has been
    /// scheduled (not once it completes).
    pub fn consumer_request_events(
        &self,
        uuid: Uuid,
        handle: Arc<dyn ConsumerHandle>,
        batch_size: BatchSize,
    ) -> Result<()> {
        let partition = self.partition(uuid)?;
        self.pool.spawn(async move {
            if let Err(err) = partition.feed_consumer(handle, batch_size).await {
                tracing::warn!(%err, "feeder exited with error");
            }
        });
        Ok(())
    }

    pub fn consumer_ack_event(&self, uuid: Uuid, consumer_name: &str, event_id: EventId) -> Result<()> {
        self.partition(uuid)?.acknowledge(consumer_name, event_id);
        Ok(())
    }

    pub fn consumer_remove_consumer(&self, uuid: Uuid) -> Result<()> {
        self.partition(uuid)?.wake_up();
        Ok(())
    }

    pub async fn consumer_request_data(
        &self,
        uuid: Uuid,
        descriptors: &[DataDescriptor],
        dest: BulkRef,
    ) -> Result<Vec<Result<()>>> {
        self.partition(uuid)?.get_data(descriptors, dest).await
    }

    pub async fn mark_partition_complete(&self, uuid: Uuid) -> Result<()> {
        self.partition(uuid)?.mark_complete().await;
        Ok(())
    }

    pub async fn destroy_partition(&self, uuid: Uuid) -> Result<()> {
        let partition = self.partition(uuid)?;
        partition.destroy().await?;
        self.partitions.write().remove(&uuid);
        Ok(())
    }

    pub fn create_topic(&self, name: &str, policy: PolicySnapshot) -> Result<()> {
        self.catalog.create_topic(name, policy)?;
        info!(topic = name, "topic created");
        Ok(())
    }

    pub fn open_topic(&self, name: &str) -> Result<TopicEntry> {
        self.catalog.get(name)
    }

    pub async fn destroy_topic(&self, name: &str) -> Result<()> {
        let entry = self.catalog.destroy_topic(name)?;
        for partition in entry.partitions {
            let _ = self.destroy_partition(partition.uuid).await;
        }
        info!(topic = name, "topic destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FeedPayload;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    struct RecordingHandle {
        name: String,
        stop: AtomicBool,
        batches: AsyncMutex<Vec<FeedPayload>>,
    }

    #[async_trait::async_trait]
    impl ConsumerHandle for RecordingHandle {
        fn name(&self) -> &str {
            &self.name
        }
        fn should_stop(&self) -> bool {
            self.stop.load(Ordering::Acquire)
        }
        async fn feed(&self, _first_id: EventId, payload: FeedPayload) -> Result<()> {
            self.batches.lock().await.push(payload);
            Ok(())
        }
    }

    fn provider() -> Provider {
        Provider::new(0, ThreadPool::new(1).unwrap())
    }

    #[test]
    fn create_topic_then_open_roundtrips_policy() {
        let p = provider();
        p.create_topic("events", PolicySnapshot::default()).unwrap();
        let entry = p.open_topic("events").unwrap();
        assert_eq!(entry.name, "events");
        assert!(entry.partitions.is_empty());
    }

    #[test]
    fn open_unknown_topic_fails() {
        let p = provider();
        assert!(matches!(p.open_topic("nope"), Err(MofkaError::UnknownTopic(_))));
    }

    #[tokio::test]
    async fn add_partition_then_send_batch_assigns_ids() {
        let p = provider();
        p.create_topic("events", PolicySnapshot::default()).unwrap();
        let uuid = p.create_partition("memory", PolicySnapshot::default()).unwrap();
        p.catalog()
            .append_partition(
                "events",
                PartitionRef {
                    uuid,
                    address: "local".to_string(),
                    provider_id: p.id(),
                },
            )
            .unwrap();

        let payload = BatchPayload::from_blocks(&[vec![1]], &[vec![0]]);
        let first = p.producer_send_batch(uuid, "prod", payload).await.unwrap();
        assert_eq!(first, 0);

        let entry = p.open_topic("events").unwrap();
        assert_eq!(entry.partitions.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_feeds_then_observes_completion() {
        let p = provider();
        let uuid = p.create_partition("memory", PolicySnapshot::default()).unwrap();
        let payload = BatchPayload::from_blocks(&[vec![1]], &[vec![0]]);
        p.producer_send_batch(uuid, "prod", payload).await.unwrap();
        p.mark_partition_complete(uuid).await.unwrap();

        let handle = Arc::new(RecordingHandle {
            name: "alice".to_string(),
            stop: AtomicBool::new(false),
            batches: AsyncMutex::new(Vec::new()),
        });
        p.consumer_request_events(uuid, handle.clone(), BatchSize::Fixed(10))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let batches = handle.batches.lock().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].count(), 1);
        assert!(batches[1].meta_sizes.is_empty());
    }

    #[tokio::test]
    async fn unknown_partition_manager_kind_is_rejected() {
        let p = provider();
        assert!(matches!(
            p.create_partition("rdma", PolicySnapshot::default()),
            Err(MofkaError::UnknownPlugin(_))
        ));
    }
}
