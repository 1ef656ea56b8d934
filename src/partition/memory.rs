use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::batching::{AdaptiveBatcher, BatchSize};
use crate::config::PartitionManagerConfig;
use crate::descriptor::DataDescriptor;
use crate::error::{MofkaError, Result};
use crate::store::DataStore;
use crate::transport::{BatchPayload, BulkRef, FeedPayload};

use super::cursor::CursorTable;
use super::traits::{ConsumerHandle, EventId, PartitionManager, PolicySnapshot, NO_MORE_EVENTS};

#[derive(Default)]
struct Log {
    /// One serialized-metadata block per ingested event.
    meta: Vec<Vec<u8>>,
    /// One serialized-DataDescriptor block per ingested event,
    /// parallel to `meta` (spec.md §4.4 state: parallel vectors).
    desc: Vec<Vec<u8>>,
    completed: bool,
}

/// Reference in-memory `PartitionManager`, grounded on spec.md §4.4.
///
/// `Vec`'s own amortized-doubling growth stands in for the reference
/// implementation's manual `reserve(2*new_len)` geometric reallocation
/// — both give O(1) amortized append, so there's nothing to hand-roll
/// here beyond what `Vec::push`/`extend` already does.
pub struct MemoryPartitionManager {
    id: uuid::Uuid,
    log: Mutex<Log>,
    cursors: CursorTable,
    arrival: Notify,
    batcher: AdaptiveBatcher,
    store: Arc<dyn DataStore>,
    policy: PolicySnapshot,
    closed: AtomicBool,
    /// How long a feeder idles between polling `should_stop()` while
    /// waiting on the arrival notifier (spec.md §4.4 step 2's wait is
    /// a condition variable; `Notify` has no poll-with-timeout
    /// primitive of its own, so we race it against a short sleep).
    idle_poll: Duration,
}

impl MemoryPartitionManager {
    pub fn new(
        id: uuid::Uuid,
        store: Arc<dyn DataStore>,
        policy: PolicySnapshot,
        config: PartitionManagerConfig,
    ) -> Self {
        Self {
            id,
            log: Mutex::new(Log::default()),
            cursors: CursorTable::new(),
            arrival: Notify::new(),
            batcher: AdaptiveBatcher::with_bounds(
                config.adaptive_batch_seed,
                config.ewma_alpha,
                config.batch_floor as u64,
                config.batch_ceiling as u64,
            ),
            store,
            policy,
            closed: AtomicBool::new(false),
            idle_poll: Duration::from_millis(config.idle_poll_millis),
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn policy(&self) -> &PolicySnapshot {
        &self.policy
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(MofkaError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PartitionManager for MemoryPartitionManager {
    async fn store_data(&self, sizes: &[usize], data: &[u8]) -> Result<Vec<DataDescriptor>> {
        self.ensure_open()?;
        let size_bytes: Vec<u8> = sizes
            .iter()
            .flat_map(|s| (*s as u64).to_le_bytes())
            .collect();
        let sizes_bulk = BulkRef::whole(crate::transport::LocalBulk::new(size_bytes));
        let data_bulk = BulkRef::whole(crate::transport::LocalBulk::new(data.to_vec()));
        self.store.store(sizes.len(), sizes_bulk, data_bulk).await
    }

    async fn receive_batch(&self, producer_name: &str, payload: BatchPayload) -> Result<EventId> {
        self.ensure_open()?;
        let metas = payload.meta_blocks()?;
        let descs = payload.desc_blocks()?;
        if metas.len() != descs.len() {
            return Err(MofkaError::Protocol(format!(
                "metadata block count {} does not match descriptor block count {}",
                metas.len(),
                descs.len()
            )));
        }

        let first_id = {
            let mut log = self.log.lock();
            let first_id = log.meta.len() as EventId;
            log.meta.extend(metas);
            log.desc.extend(descs);
            first_id
        };
        debug!(partition = %self.id, producer_name, first_id, n = payload.count(), "batch ingested");
        self.arrival.notify_waiters();
        Ok(first_id)
    }

    async fn feed_consumer(
        &self,
        handle: Arc<dyn ConsumerHandle>,
        batch_size: BatchSize,
    ) -> Result<()> {
        let name = handle.name().to_string();
        let mut cursor = self.cursors.get_or_init(&name);
        info!(partition = %self.id, consumer = %name, start = cursor, "feeder attached");

        loop {
            if handle.should_stop() {
                return Ok(());
            }
            let (len, completed) = {
                let log = self.log.lock();
                (log.meta.len() as EventId, log.completed)
            };

            if cursor >= len {
                if completed {
                    handle.feed(NO_MORE_EVENTS, FeedPayload::default()).await?;
                    info!(partition = %self.id, consumer = %name, "feeder observed completion");
                    return Ok(());
                }
                let notified = self.arrival.notified();
                tokio::select! {
                    _ = notified => {},
                    _ = tokio::time::sleep(self.idle_poll) => {},
                }
                continue;
            }

            let available = (len - cursor) as usize;
            let take = self.batcher.take(batch_size, available);
            let start = tokio::time::Instant::now();
            let (metas, descs) = {
                let log = self.log.lock();
                let lo = cursor as usize;
                let hi = lo + take;
                (log.meta[lo..hi].to_vec(), log.desc[lo..hi].to_vec())
            };
            let payload = BatchPayload::from_blocks(&metas, &descs);
            handle.feed(cursor, payload).await?;
            self.batcher
                .record(start.elapsed().as_secs_f64() * 1000.0);
            cursor += take as EventId;
        }
    }

    fn acknowledge(&self, consumer_name: &str, event_id: EventId) {
        self.cursors.acknowledge(consumer_name, event_id);
    }

    async fn get_data(&self, descriptors: &[DataDescriptor], dest: BulkRef) -> Result<Vec<Result<()>>> {
        self.ensure_open()?;
        self.store.load(descriptors, dest).await
    }

    fn wake_up(&self) {
        self.arrival.notify_waiters();
    }

    async fn mark_complete(&self) {
        let mut log = self.log.lock();
        if log.completed {
            return;
        }
        log.completed = true;
        drop(log);
        info!(partition = %self.id, "marked complete");
        self.arrival.notify_waiters();
    }

    async fn destroy(&self) -> Result<()> {
        self.ensure_open()?;
        self.closed.store(true, Ordering::Release);
        let mut log = self.log.lock();
        log.meta.clear();
        log.desc.clear();
        // Wakes any feeder stuck waiting on more events; a destroyed
        // partition will never produce any, so it observes completion
        // the same way `markAsComplete` would (spec.md §8 scenario 6
        // permits either `NoMoreEvents` or `Closed` here).
        log.completed = true;
        drop(log);
        self.store.destroy().await?;
        self.arrival.notify_waiters();
        info!(partition = %self.id, "destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDataStore;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use tokio::sync::Mutex as AsyncMutex;

    struct TestHandle {
        name: String,
        stop: StdAtomicBool,
        received: AsyncMutex<Vec<(EventId, FeedPayload)>>,
    }

    impl TestHandle {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                stop: StdAtomicBool::new(false),
                received: AsyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ConsumerHandle for TestHandle {
        fn name(&self) -> &str {
            &self.name
        }

        fn should_stop(&self) -> bool {
            self.stop.load(Ordering::Acquire)
        }

        async fn feed(&self, first_id: EventId, payload: FeedPayload) -> Result<()> {
            self.received.lock().await.push((first_id, payload));
            Ok(())
        }
    }

    fn manager() -> MemoryPartitionManager {
        MemoryPartitionManager::new(
            uuid::Uuid::new_v4(),
            Arc::new(MemoryDataStore::new()),
            PolicySnapshot::default(),
            PartitionManagerConfig::default(),
        )
    }

    fn batch(n: usize) -> BatchPayload {
        let metas: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8]).collect();
        let descs: Vec<Vec<u8>> = (0..n).map(|_| vec![0u8]).collect();
        BatchPayload::from_blocks(&metas, &descs)
    }

    #[tokio::test]
    async fn receive_batch_assigns_dense_ids_starting_at_zero() {
        let mgr = manager();
        let first = mgr.receive_batch("p", batch(3)).await.unwrap();
        assert_eq!(first, 0);
        let second = mgr.receive_batch("p", batch(2)).await.unwrap();
        assert_eq!(second, 3);
    }

    #[tokio::test]
    async fn feed_consumer_delivers_ingested_batch_then_stops() {
        let mgr = manager();
        mgr.receive_batch("p", batch(4)).await.unwrap();

        let handle = TestHandle::new("alice");
        let stop_handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop_handle.stop.store(true, Ordering::Release);
        });

        mgr.feed_consumer(handle.clone(), BatchSize::Fixed(10))
            .await
            .unwrap();

        let received = handle.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, 0);
        assert_eq!(received[0].1.count(), 4);
    }

    #[tokio::test]
    async fn feed_consumer_resumes_from_acked_cursor_on_resubscribe() {
        let mgr = manager();
        mgr.receive_batch("p", batch(5)).await.unwrap();
        mgr.acknowledge("alice", 2);

        let handle = TestHandle::new("alice");
        let stop_handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop_handle.stop.store(true, Ordering::Release);
        });
        mgr.feed_consumer(handle.clone(), BatchSize::Fixed(10))
            .await
            .unwrap();

        let received = handle.received.lock().await;
        assert_eq!(received[0].0, 3);
        assert_eq!(received[0].1.count(), 2);
    }

    #[tokio::test]
    async fn feed_consumer_feeds_sentinel_after_mark_complete() {
        let mgr = manager();
        mgr.receive_batch("p", batch(1)).await.unwrap();
        mgr.mark_complete().await;

        let handle = TestHandle::new("alice");
        mgr.feed_consumer(handle.clone(), BatchSize::Fixed(10))
            .await
            .unwrap();

        let received = handle.received.lock().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].0, NO_MORE_EVENTS);
    }

    #[tokio::test]
    async fn store_data_returns_one_descriptor_per_size() {
        let mgr = manager();
        let data = vec![1u8, 2, 3, 4, 5];
        let descriptors = mgr.store_data(&[3, 2], &data).await.unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].current_size(), 3);
        assert_eq!(descriptors[1].current_size(), 2);
    }

    #[tokio::test]
    async fn destroy_then_receive_batch_fails_closed() {
        let mgr = manager();
        mgr.destroy().await.unwrap();
        let err = mgr.receive_batch("p", batch(1)).await.unwrap_err();
        assert!(matches!(err, MofkaError::Closed));
    }

    #[tokio::test]
    async fn destroy_wakes_a_waiting_feeder_with_sentinel() {
        let mgr = manager();
        let handle = TestHandle::new("alice");
        let feeder = {
            let mgr = Arc::new(mgr);
            let mgr_feed = mgr.clone();
            let handle_feed = handle.clone();
            let join = tokio::spawn(async move { mgr_feed.feed_consumer(handle_feed, BatchSize::Fixed(10)).await });
            tokio::time::sleep(Duration::from_millis(20)).await;
            mgr.destroy().await.unwrap();
            join
        };
        feeder.await.unwrap().unwrap();
        let received = handle.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, NO_MORE_EVENTS);
    }
}
