//! Client-side batch assembler (spec.md §4.7): validates, routes,
//! serializes, and batches events before shipping them to the target
//! partition's `PartitionManager`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use crate::config::ProducerConfig;
use crate::data::DataView;
use crate::descriptor::DataDescriptor;
use crate::driver::TopicHandle;
use crate::error::{MofkaError, Result};
use crate::metadata::Metadata;
use crate::partition::EventId;
use crate::sched::{new_promise_future, Future, Promise, ThreadPool};
use crate::transport::BatchPayload;

use crate::batching::{AdaptiveBatcher, BatchSize};

/// Ordering guarantee a Producer gives for pushes landing on the same
/// partition (spec.md §5 "Ordering guarantees").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Only one batch per partition may be in flight; push order
    /// within a partition matches EventID order.
    Strict,
    /// Up to `max_in_flight` batches per partition may be in flight;
    /// EventIDs are still dense and server-assigned, but futures may
    /// complete out of push order across batches.
    Loose,
}

/// Marker value `flush()` resolves with once every outstanding batch
/// has been acknowledged by its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flushed;

#[derive(Default)]
struct ActiveBatch {
    metas: Vec<Vec<u8>>,
    data: Vec<u8>,
    data_sizes: Vec<usize>,
    promises: Vec<Promise<EventId>>,
}

struct PartitionSlot {
    uuid: Uuid,
    active: Mutex<ActiveBatch>,
    inflight: Arc<Semaphore>,
    permits: u32,
    batcher: Arc<AdaptiveBatcher>,
}

/// Client-side batch assembler, one per (topic, producer name) pair.
///
/// Grounded on the teacher's request-batching client plumbing, adapted
/// to the per-partition active-batch queues and Strict/Loose ordering
/// modes spec.md §4.7 describes.
pub struct Producer {
    name: String,
    topic: TopicHandle,
    batch_size: BatchSize,
    ordering: OrderingMode,
    thread_pool: ThreadPool,
    slots: Vec<Arc<PartitionSlot>>,
}

impl Producer {
    /// Builds a Producer from `config` (spec.md §4.7 owned state),
    /// threading its `strict_ordering`/`max_in_flight`/
    /// `default_batch_size` fields straight into the per-partition
    /// slots rather than taking them as loose positional arguments.
    pub fn new(
        name: impl Into<String>,
        topic: TopicHandle,
        config: ProducerConfig,
        thread_pool: ThreadPool,
    ) -> Self {
        let ordering = if config.strict_ordering {
            OrderingMode::Strict
        } else {
            OrderingMode::Loose
        };
        let permits = match ordering {
            OrderingMode::Strict => 1,
            OrderingMode::Loose => config.max_in_flight.max(1) as u32,
        };
        let slots = topic
            .partitions()
            .iter()
            .map(|p| {
                Arc::new(PartitionSlot {
                    uuid: p.uuid,
                    active: Mutex::new(ActiveBatch::default()),
                    inflight: Arc::new(Semaphore::new(permits as usize)),
                    permits,
                    batcher: Arc::new(AdaptiveBatcher::new()),
                })
            })
            .collect();
        Self {
            name: name.into(),
            topic,
            batch_size: BatchSize::Fixed(config.default_batch_size),
            ordering,
            thread_pool,
            slots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordering(&self) -> OrderingMode {
        self.ordering
    }

    /// Validate, route, serialize, and accumulate one event into its
    /// partition's active batch, sealing and shipping it once the
    /// batch-size threshold is reached (spec.md §4.7 steps 1-5).
    pub fn push(&self, metadata: Metadata, data: DataView, partition: Option<usize>) -> Future<EventId> {
        let (promise, future) = new_promise_future();

        if let Err(err) = self.topic.validator().validate(&metadata, &data) {
            promise.set_error(err);
            return future;
        }

        let idx = match self
            .topic
            .selector()
            .select_partition_for(&metadata, partition)
        {
            Ok(idx) => idx,
            Err(err) => {
                promise.set_error(err);
                return future;
            }
        };

        let Some(slot) = self.slots.get(idx).cloned() else {
            promise.set_error(MofkaError::Protocol(format!(
                "selector chose out-of-range partition {idx} (topic has {} partitions)",
                self.slots.len()
            )));
            return future;
        };

        let meta_bytes = match self.topic.serializer().serialize(&metadata) {
            Ok(bytes) => bytes,
            Err(err) => {
                promise.set_error(err);
                return future;
            }
        };

        let sealed = {
            let mut active = slot.active.lock();
            active.metas.push(meta_bytes);
            active.data_sizes.push(data.total_size());
            active.data.extend(data.to_contiguous());
            active.promises.push(promise);

            let threshold = slot.batcher.threshold(self.batch_size);
            if active.metas.len() >= threshold {
                Some(std::mem::take(&mut *active))
            } else {
                None
            }
        };

        if let Some(batch) = sealed {
            self.spawn_sender(slot, batch);
        }

        future
    }

    /// Seals every partition's partially-filled batch and resolves
    /// once all outstanding batches (including ones already sealed by
    /// `push`) have been acknowledged.
    pub fn flush(&self) -> Future<Flushed> {
        let (promise, future) = new_promise_future();

        for slot in &self.slots {
            let sealed = {
                let mut active = slot.active.lock();
                if active.metas.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut *active))
                }
            };
            if let Some(batch) = sealed {
                self.spawn_sender(slot.clone(), batch);
            }
        }

        let slots = self.slots.clone();
        self.thread_pool.spawn(async move {
            for slot in slots {
                // Acquiring every permit only succeeds once no sender
                // task is mid-flight against this partition, i.e. the
                // partition is fully drained; release them right back.
                if let Ok(guard) = slot.inflight.clone().acquire_many_owned(slot.permits).await {
                    drop(guard);
                }
            }
            promise.set_value(Flushed);
        });

        future
    }

    fn spawn_sender(&self, slot: Arc<PartitionSlot>, batch: ActiveBatch) {
        let provider = self.topic.provider();
        let name = self.name.clone();
        self.thread_pool.spawn(async move {
            let Ok(permit) = slot.inflight.clone().acquire_owned().await else {
                return;
            };
            let start = tokio::time::Instant::now();
            let result = seal_and_send(provider.as_ref(), slot.uuid, &name, &batch).await;
            match result {
                Ok(first_id) => {
                    debug!(partition = %slot.uuid, producer = %name, first_id, n = batch.promises.len(), "batch acknowledged");
                    for (i, promise) in batch.promises.into_iter().enumerate() {
                        promise.set_value(first_id + i as EventId);
                    }
                }
                Err(err) => {
                    for promise in batch.promises {
                        promise.set_error(err.clone());
                    }
                }
            }
            slot.batcher.record(start.elapsed().as_secs_f64() * 1000.0);
            drop(permit);
        });
    }
}

async fn seal_and_send(
    provider: &crate::provider::Provider,
    uuid: Uuid,
    producer_name: &str,
    batch: &ActiveBatch,
) -> Result<EventId> {
    let descriptors = provider
        .producer_store_data(uuid, &batch.data_sizes, &batch.data)
        .await?;
    let desc_blocks = descriptors
        .iter()
        .map(|d: &DataDescriptor| {
            serde_json::to_vec(d)
                .map_err(|e| MofkaError::Protocol(format!("failed to encode data descriptor: {e}")))
        })
        .collect::<Result<Vec<Vec<u8>>>>()?;
    let payload = BatchPayload::from_blocks(&batch.metas, &desc_blocks);
    provider.producer_send_batch(uuid, producer_name, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ServiceHandle;
    use crate::partition::PolicySpec;
    use crate::provider::Provider;

    fn topic(partitions: usize) -> TopicHandle {
        let pool = ThreadPool::new(2).unwrap();
        let provider = Arc::new(Provider::new(0, pool));
        let service = ServiceHandle::new(provider);
        service
            .create_topic(
                "events",
                PolicySpec::new("default", Metadata::empty()),
                PolicySpec::new("default", Metadata::empty()),
                PolicySpec::new("default", Metadata::empty()),
            )
            .unwrap();
        for _ in 0..partitions {
            service.add_partition("events", "memory").unwrap();
        }
        service.open_topic("events").unwrap()
    }

    #[tokio::test]
    async fn push_then_flush_resolves_with_server_assigned_ids() {
        let topic = topic(1);
        let producer = Producer::new(
            "p1",
            topic,
            ProducerConfig {
                default_batch_size: 10,
                max_in_flight: 4,
                strict_ordering: false,
            },
            ThreadPool::from_current().unwrap(),
        );

        let f0 = producer.push(Metadata::empty(), DataView::from_bytes(vec![1, 2, 3]), None);
        let f1 = producer.push(Metadata::empty(), DataView::from_bytes(vec![4, 5]), None);
        producer.flush().wait().await.unwrap();

        assert_eq!(f0.wait().await.unwrap(), 0);
        assert_eq!(f1.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn push_seals_automatically_at_batch_threshold() {
        let topic = topic(1);
        let producer = Producer::new(
            "p1",
            topic,
            ProducerConfig {
                default_batch_size: 2,
                max_in_flight: 4,
                strict_ordering: true,
            },
            ThreadPool::from_current().unwrap(),
        );

        let f0 = producer.push(Metadata::empty(), DataView::from_bytes(vec![1]), None);
        let f1 = producer.push(Metadata::empty(), DataView::from_bytes(vec![2]), None);
        // Threshold of 2 is hit by the second push, which seals and
        // ships without an explicit flush().
        assert_eq!(f0.wait().await.unwrap(), 0);
        assert_eq!(f1.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_metadata_fails_future_without_touching_server() {
        let pool = ThreadPool::new(1).unwrap();
        let provider = Arc::new(Provider::new(0, pool));
        let service = ServiceHandle::new(provider);
        // A validator that rejects every event missing "must_have".
        crate::policy::registry().register_validator("reject_all", |_cfg| {
            Ok(Arc::new(crate::policy::RequiredFieldsValidator::new(vec![
                "must_have".to_string(),
            ])) as Arc<dyn crate::policy::Validator>)
        });
        service
            .create_topic(
                "strict",
                PolicySpec::new("reject_all", Metadata::empty()),
                PolicySpec::new("default", Metadata::empty()),
                PolicySpec::new("default", Metadata::empty()),
            )
            .unwrap();
        service.add_partition("strict", "memory").unwrap();
        let topic = service.open_topic("strict").unwrap();

        let producer = Producer::new(
            "p1",
            topic,
            ProducerConfig {
                default_batch_size: 10,
                max_in_flight: 1,
                strict_ordering: true,
            },
            ThreadPool::from_current().unwrap(),
        );
        let future = producer.push(Metadata::empty(), DataView::empty(), None);
        let err = future.wait().await.unwrap_err();
        assert!(matches!(err, MofkaError::InvalidMetadata(_)));
    }

    #[tokio::test]
    async fn requesting_out_of_range_partition_fails_future() {
        let topic = topic(1);
        let producer = Producer::new(
            "p1",
            topic,
            ProducerConfig {
                default_batch_size: 10,
                max_in_flight: 1,
                strict_ordering: true,
            },
            ThreadPool::from_current().unwrap(),
        );
        let future = producer.push(Metadata::empty(), DataView::empty(), Some(5));
        assert!(future.wait().await.is_err());
    }
}
