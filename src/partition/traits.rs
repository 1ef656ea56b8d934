use std::sync::Arc;

use async_trait::async_trait;

use crate::batching::BatchSize;
use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::transport::{BulkRef, FeedPayload};

/// A partition-local, dense, monotonic event identifier (spec.md §3).
pub type EventId = u64;

/// Sentinel EventID fed once a partition is marked complete, signalling
/// "no more events will arrive" to subscribed consumers.
pub const NO_MORE_EVENTS: EventId = u64::MAX;

/// A policy plug-in's name (`"key"` or `"key:path/to/lib"`, spec.md
/// §4.3) plus the config it was constructed with — exactly the `{
/// type: string, config: json }` shape spec.md §6's topic catalogue
/// entry persists per policy.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PolicySpec {
    pub r#type: String,
    pub config: Metadata,
}

impl PolicySpec {
    pub fn new(name: impl Into<String>, config: Metadata) -> Self {
        Self {
            r#type: name.into(),
            config,
        }
    }
}

/// Immutable snapshot of the three policy plug-ins a topic was created
/// with, carried by both the PartitionManager (spec.md §4.4 state
/// list) and the topic directory (spec.md §3 Topic entity) so every
/// server instantiates the same policy.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PolicySnapshot {
    pub validator: PolicySpec,
    pub selector: PolicySpec,
    pub serializer: PolicySpec,
}

/// The server's view of an attached consumer subscription (spec.md
/// §4.4 `feedConsumer`, §4.5 `consumer_request_events`).
///
/// In the reference C++, this re-invokes an RPC back at the consumer;
/// here the consumer attaches an in-process handle the manager calls
/// directly, since the RPC transport itself is out of scope (spec.md
/// §1).
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    /// The consumer name this handle was subscribed under.
    fn name(&self) -> &str;

    /// Polled by the manager's feed loop; once true, the loop exits
    /// cleanly without feeding further batches.
    fn should_stop(&self) -> bool;

    /// Deliver one feed batch starting at `first_id`.
    async fn feed(&self, first_id: EventId, payload: FeedPayload) -> Result<()>;
}

/// Per-partition state machine (spec.md §4.4): owns the event log,
/// consumer cursors, and (via a DataStore) the payload bytes.
#[async_trait]
pub trait PartitionManager: Send + Sync {
    /// Stages a sealed batch's raw payload bytes in this partition's
    /// DataStore, returning one DataDescriptor per event in order.
    ///
    /// A producer calls this before `receive_batch` to turn its
    /// events' DataViews into the descriptor tokens the batch's
    /// `desc_bytes` block carries — the same contract
    /// `DataStore::store` exposes (spec.md §4.2), reached here rather
    /// than by the producer holding a DataStore reference directly,
    /// since the DataStore is partition-owned state (spec.md §3
    /// Ownership).
    async fn store_data(&self, sizes: &[usize], data: &[u8]) -> Result<Vec<DataDescriptor>>;

    /// Ingests `payload`'s events, returning the EventID assigned to
    /// the first one (the rest are dense and contiguous from there).
    async fn receive_batch(&self, producer_name: &str, payload: BatchPayload) -> Result<EventId>;

    /// Attaches `handle` and feeds it batches until it asks to stop or
    /// the partition is destroyed. Intended to be spawned onto a
    /// `ThreadPool`, not awaited inline by the caller that subscribes.
    async fn feed_consumer(&self, handle: Arc<dyn ConsumerHandle>, batch_size: BatchSize) -> Result<()>;

    /// Durably raises `consumer_name`'s cursor to `event_id + 1`.
    /// Never regresses it.
    fn acknowledge(&self, consumer_name: &str, event_id: EventId);

    /// Resolves `descriptors` (delegating to the DataStore) and pushes
    /// the bytes into `dest`, reporting one `Result` per descriptor so
    /// a single bad one doesn't sink the rest (spec.md §4.4 `getData`).
    async fn get_data(&self, descriptors: &[DataDescriptor], dest: BulkRef) -> Result<Vec<Result<()>>>;

    /// Breaks any feeder currently idling on the arrival wait.
    fn wake_up(&self);

    /// Marks the partition complete: once the log is drained, feeders
    /// observe `NO_MORE_EVENTS` and exit.
    async fn mark_complete(&self);

    /// Drains and releases all state. Subsequent calls on this
    /// manager fail with `Closed`.
    async fn destroy(&self) -> Result<()>;
}

pub use crate::transport::BatchPayload;
