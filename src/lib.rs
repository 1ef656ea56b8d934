pub mod batching;
pub mod config;
pub mod consumer;
pub mod data;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod metadata;
pub mod partition;
pub mod policy;
pub mod producer;
pub mod provider;
pub mod sched;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use config::{ConsumerConfig, PartitionManagerConfig, ProducerConfig};
pub use consumer::{Consumer, DataAllocator, DataSelector, Event};
pub use data::{DataSegment, DataView};
pub use descriptor::{DataDescriptor, ViewTransform};
pub use driver::{ServiceHandle, TopicHandle};
pub use error::{MofkaError, Result};
pub use metadata::Metadata;
pub use partition::{
    ConsumerHandle, EventId, MemoryPartitionManager, PartitionManager, PolicySnapshot, PolicySpec,
    NO_MORE_EVENTS,
};
pub use policy::{PartitionSelector, PolicyRegistry, Serializer, Validator};
pub use producer::{OrderingMode, Flushed, Producer};
pub use provider::{PartitionRef, Provider, TopicCatalog, TopicEntry};
pub use sched::{Future, Promise, ThreadPool};
pub use store::{DataStore, MemoryDataStore};
pub use transport::{BatchPayload, BulkHandle, BulkRef, FeedPayload, LocalBulk};
pub use batching::{AdaptiveBatcher, BatchSize};
