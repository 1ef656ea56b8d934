//! Client-side puller (spec.md §4.8): subscribes to every partition of
//! a topic, deserializes and fetches payloads for arriving events, and
//! exposes them one at a time through `pull()`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::batching::BatchSize;
use crate::config::ConsumerConfig;
use crate::data::DataView;
use crate::descriptor::DataDescriptor;
use crate::driver::TopicHandle;
use crate::error::{MofkaError, Result};
use crate::metadata::Metadata;
use crate::partition::{ConsumerHandle, EventId, NO_MORE_EVENTS};
use crate::provider::Provider;
use crate::sched::{new_promise_future, Future, Promise, ThreadPool};
use crate::transport::{BulkRef, FeedPayload, LocalBulk};

/// The partition/consumer-name context an `Event` needs to issue its
/// own `acknowledge()`, mirroring `MofkaEvent`'s stored partition
/// handle and RPC binding (`include/mofka/MofkaEvent.hpp`).
#[derive(Clone)]
struct AckContext {
    provider: Arc<Provider>,
    partition: Uuid,
    consumer_name: String,
}

/// One event delivered to a consumer: its server-assigned EventID,
/// deserialized metadata, and fetched payload.
///
/// `NO_MORE_EVENTS`-sentinel delivery (all subscribed partitions
/// drained) is surfaced as an `Event` whose `id` equals
/// [`NO_MORE_EVENTS`] rather than as a distinct type, so `pull()`'s
/// future stays uniformly `Future<Event>` (spec.md §4.8).
#[derive(Clone)]
pub struct Event {
    pub id: EventId,
    /// Which subscribed partition this event arrived on
    /// (`MofkaEvent::partition()`, `include/mofka/MofkaEvent.hpp`) —
    /// `Uuid::nil()` for the synthetic end-of-stream event, since it
    /// isn't tied to any one partition.
    pub partition: Uuid,
    pub metadata: Metadata,
    pub data: DataView,
    ack: Option<AckContext>,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("partition", &self.partition)
            .field("metadata", &self.metadata)
            .field("data", &self.data)
            .finish()
    }
}

impl Event {
    fn end_of_stream() -> Self {
        Self {
            id: NO_MORE_EVENTS,
            partition: Uuid::nil(),
            metadata: Metadata::empty(),
            data: DataView::empty(),
            ack: None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.id == NO_MORE_EVENTS
    }

    /// Raises this event's partition cursor past `id`
    /// (`consumer_ack_event`, spec.md §6). Durable progress happens
    /// here, not on feed delivery (spec.md §4.4 step 1 note).
    pub fn acknowledge(&self) -> Result<()> {
        if self.is_end_of_stream() {
            return Err(MofkaError::Protocol("cannot acknowledge NoMoreEvents".to_string()));
        }
        let ack = self
            .ack
            .as_ref()
            .ok_or_else(|| MofkaError::Protocol("event carries no acknowledge context".to_string()))?;
        ack.provider.consumer_ack_event(ack.partition, &ack.consumer_name, self.id)
    }
}

/// Narrows or nulls a descriptor before the consumer fetches its
/// bytes (spec.md §4.8 step 2c).
pub type DataSelector = Arc<dyn Fn(&Metadata, &DataDescriptor) -> DataDescriptor + Send + Sync>;

/// Produces the destination `DataView` a fetched descriptor's bytes
/// are pulled into (spec.md §4.8 step 2d); only its `total_size()` is
/// consulted here, since the actual destination storage is this
/// crate's in-process `LocalBulk`.
pub type DataAllocator = Arc<dyn Fn(&Metadata, &DataDescriptor) -> DataView + Send + Sync>;

fn default_data_selector() -> DataSelector {
    Arc::new(|_metadata, descriptor| descriptor.clone())
}

fn default_data_allocator() -> DataAllocator {
    Arc::new(|_metadata, descriptor| DataView::from_bytes(vec![0u8; descriptor.current_size()]))
}

/// FIFO exchange between `pull()` callers and arriving events,
/// implementing the credit discipline spec.md §4.8 describes: whichever
/// side (pulls or arrivals) is ahead leaves entries in the deque for
/// the other side to consume.
#[derive(Default)]
struct PendingState {
    /// Promises created by `pull()` still waiting on an event
    /// (non-empty only when pulls have outpaced arrivals).
    waiting: VecDeque<Promise<Event>>,
    /// Futures already resolved by an arrival, waiting for `pull()`
    /// to claim them (non-empty only when arrivals have outpaced pulls).
    ready: VecDeque<Future<Event>>,
    /// Mirrors which side currently holds entries: `true` once a
    /// `pull()` is left waiting, `false` once an arrival left a ready
    /// future behind. Purely observational bookkeeping alongside the
    /// deques above.
    credit: bool,
    completed_partitions: usize,
    all_completed: bool,
}

struct ConsumerInner {
    name: String,
    topic: TopicHandle,
    data_selector: DataSelector,
    data_allocator: DataAllocator,
    pending: Mutex<PendingState>,
    handles: Mutex<Vec<Arc<ConsumerFeedHandle>>>,
    total_partitions: usize,
    /// Bounds how many feed batches may be mid-delivery (fetching data,
    /// deserializing, handing off to `pull()`) at once across every
    /// subscribed partition (spec.md §4.8 owned state "max-in-flight
    /// batches", mirroring Producer's `max_in_flight`).
    inflight: Arc<Semaphore>,
}

impl ConsumerInner {
    fn deliver(&self, event: Event) {
        let mut state = self.pending.lock();
        if let Some(promise) = state.waiting.pop_front() {
            promise.set_value(event);
            state.credit = !state.waiting.is_empty();
        } else {
            let (promise, future) = new_promise_future();
            promise.set_value(event);
            state.ready.push_back(future);
            state.credit = false;
        }
    }

    fn note_partition_complete(&self) {
        let mut state = self.pending.lock();
        state.completed_partitions += 1;
        if state.completed_partitions >= self.total_partitions {
            state.all_completed = true;
            while let Some(promise) = state.waiting.pop_front() {
                promise.set_value(Event::end_of_stream());
            }
            state.credit = false;
        }
    }
}

/// The server-facing half of a subscription: one per attached
/// partition, forwarding feed batches into the shared `ConsumerInner`.
struct ConsumerFeedHandle {
    name: String,
    uuid: Uuid,
    stop: AtomicBool,
    inner: Weak<ConsumerInner>,
}

#[async_trait]
impl ConsumerHandle for ConsumerFeedHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    async fn feed(&self, first_id: EventId, payload: FeedPayload) -> Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };

        if first_id == NO_MORE_EVENTS {
            inner.note_partition_complete();
            return Ok(());
        }

        let Ok(_permit) = inner.inflight.clone().acquire_owned().await else {
            return Ok(());
        };

        let metas = payload.meta_blocks()?;
        let descs = payload.desc_blocks()?;
        if metas.len() != descs.len() {
            return Err(MofkaError::Protocol(format!(
                "feed batch metadata count {} does not match descriptor count {}",
                metas.len(),
                descs.len()
            )));
        }

        for (i, (meta_bytes, desc_bytes)) in metas.into_iter().zip(descs.into_iter()).enumerate() {
            let metadata = inner.topic.serializer().deserialize(&meta_bytes)?;
            let descriptor: DataDescriptor = serde_json::from_slice(&desc_bytes).map_err(|e| {
                MofkaError::Protocol(format!("malformed data descriptor: {e}"))
            })?;
            let selected = (inner.data_selector)(&metadata, &descriptor);

            let data = if selected.is_null() {
                DataView::empty()
            } else {
                let allocated = (inner.data_allocator)(&metadata, &selected);
                let dest = LocalBulk::with_capacity(allocated.total_size());
                let outcomes = inner
                    .topic
                    .provider()
                    .consumer_request_data(
                        self.uuid,
                        std::slice::from_ref(&selected),
                        BulkRef::whole(dest.clone()),
                    )
                    .await?;
                if let Some(outcome) = outcomes.into_iter().next() {
                    outcome?;
                }
                DataView::from_bytes(dest.into_inner())
            };

            let event = Event {
                id: first_id + i as EventId,
                partition: self.uuid,
                metadata,
                data,
                ack: Some(AckContext {
                    provider: inner.topic.provider(),
                    partition: self.uuid,
                    consumer_name: self.name.clone(),
                }),
            };
            inner.deliver(event);
        }
        Ok(())
    }
}

/// Client-side puller, subscribed to every partition of a topic at
/// construction time (spec.md §4.8 "Subscribe").
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

impl Consumer {
    /// Builds a Consumer from `config` (spec.md §4.8 owned state),
    /// subscribing to every partition of `topic` with
    /// `config.default_batch_size` and bounding concurrent in-flight
    /// feed batches to `config.max_in_flight`.
    pub fn new(
        name: impl Into<String>,
        topic: TopicHandle,
        config: ConsumerConfig,
        data_selector: Option<DataSelector>,
        data_allocator: Option<DataAllocator>,
    ) -> Result<Self> {
        let name = name.into();
        let total_partitions = topic.partitions().len();
        let inner = Arc::new(ConsumerInner {
            name: name.clone(),
            topic: topic.clone(),
            data_selector: data_selector.unwrap_or_else(default_data_selector),
            data_allocator: data_allocator.unwrap_or_else(default_data_allocator),
            pending: Mutex::new(PendingState::default()),
            handles: Mutex::new(Vec::new()),
            total_partitions,
            inflight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        });

        let batch_size = BatchSize::Fixed(config.default_batch_size);
        for partition in topic.partitions() {
            let handle = Arc::new(ConsumerFeedHandle {
                name: name.clone(),
                uuid: partition.uuid,
                stop: AtomicBool::new(false),
                inner: Arc::downgrade(&inner),
            });
            inner.handles.lock().push(handle.clone());
            topic
                .provider()
                .consumer_request_events(partition.uuid, handle, batch_size)?;
        }

        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the next event in delivery order, under the credit
    /// discipline spec.md §4.8 describes. Once every partition has
    /// signalled completion, resolves immediately with an
    /// end-of-stream `Event`.
    pub fn pull(&self) -> Future<Event> {
        let mut state = self.inner.pending.lock();
        if let Some(future) = state.ready.pop_front() {
            state.credit = !state.ready.is_empty();
            return future;
        }
        if state.all_completed {
            let (promise, future) = new_promise_future();
            promise.set_value(Event::end_of_stream());
            return future;
        }
        let (promise, future) = new_promise_future();
        state.waiting.push_back(promise);
        state.credit = true;
        future
    }

    /// Pulls events and hands each to `processor` until an
    /// end-of-stream event arrives or `max_events` have been
    /// processed, whichever comes first. Sugar over repeated `pull()`
    /// calls, spawned onto `thread_pool` so the caller isn't blocked.
    pub fn process<P>(
        &self,
        thread_pool: &ThreadPool,
        mut processor: P,
        max_events: Option<usize>,
    ) -> tokio::task::JoinHandle<Result<usize>>
    where
        P: FnMut(Event) -> Result<()> + Send + 'static,
    {
        let consumer = self.clone();
        thread_pool.spawn(async move {
            let mut processed = 0usize;
            loop {
                if let Some(max) = max_events {
                    if processed >= max {
                        break;
                    }
                }
                let event = consumer.pull().wait().await?;
                if event.is_end_of_stream() {
                    break;
                }
                processor(event)?;
                processed += 1;
            }
            Ok(processed)
        })
    }

    /// Detaches from every subscribed partition and stops its feed
    /// loops; already-delivered events remain claimable via `pull()`.
    pub fn unsubscribe(&self) -> Result<()> {
        let handles = self.inner.handles.lock();
        for handle in handles.iter() {
            handle.stop.store(true, Ordering::Release);
            self.inner.topic.provider().consumer_remove_consumer(handle.uuid)?;
        }
        Ok(())
    }
}
