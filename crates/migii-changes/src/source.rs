use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use migii_core::config::RealtimeConfig;
use migii_core::Scheduler;
use migii_protocol::{ChangeEvent, OperationKind};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::feed::{ChangeFeed, ChangeStream};

#[derive(Debug, Clone)]
pub struct ChangeSourceConfig {
    pub watched_collections: Vec<String>,
    pub poll_interval: Duration,
    pub poll_batch: usize,
}

impl From<&RealtimeConfig> for ChangeSourceConfig {
    fn from(cfg: &RealtimeConfig) -> Self {
        Self {
            watched_collections: cfg.watched_collections.clone(),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            poll_batch: cfg.poll_batch,
        }
    }
}

/// Outcome of the startup topology probe.
pub enum Armed {
    /// All watched collections have an open native stream, merged into one.
    Streaming(ChangeStream),
    /// Fixed-interval polling of the most recently updated records.
    Polling,
}

impl Armed {
    pub fn is_polling(&self) -> bool {
        matches!(self, Armed::Polling)
    }
}

/// Produces change events for the watched collections until shutdown.
pub struct ChangeSource {
    feed: Arc<dyn ChangeFeed>,
    config: ChangeSourceConfig,
    scheduler: Arc<dyn Scheduler>,
    fallbacks: AtomicU32,
}

impl ChangeSource {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        config: ChangeSourceConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            feed,
            config,
            scheduler,
            fallbacks: AtomicU32::new(0),
        }
    }

    /// How many times the poll fallback has been armed.
    pub fn fallbacks_armed(&self) -> u32 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Probe the store and open one native stream per watched collection.
    ///
    /// Any failure to open a stream is logged and turns into polling; it is
    /// never returned to the caller.
    pub async fn arm(&self) -> Armed {
        if !self.feed.supports_change_streams().await {
            info!("store has no native change streams");
            return self.arm_polling();
        }

        let mut streams = Vec::with_capacity(self.config.watched_collections.len());
        for collection in &self.config.watched_collections {
            match self.feed.open_stream(collection).await {
                Ok(s) => streams.push(s),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "failed to open change stream, falling back to polling");
                    return self.arm_polling();
                }
            }
        }

        info!(collections = streams.len(), "native change streams open");
        Armed::Streaming(stream::select_all(streams).boxed())
    }

    fn arm_polling(&self) -> Armed {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            batch = self.config.poll_batch,
            "poll fallback armed"
        );
        Armed::Polling
    }

    /// Main loop. Forwards events to `tx` until `shutdown` flips to `true`,
    /// the sender is dropped, or the receiver goes away.
    pub async fn run(&self, tx: mpsc::Sender<ChangeEvent>, mut shutdown: watch::Receiver<bool>) {
        if let Armed::Streaming(mut changes) = self.arm().await {
            loop {
                tokio::select! {
                    next = changes.next() => match next {
                        Some(ev) => {
                            debug!(collection = %ev.collection, operation = %ev.operation, "change observed");
                            if !forward(&tx, ev, &mut shutdown).await {
                                return;
                            }
                        }
                        None => {
                            warn!("all change streams ended");
                            break;
                        }
                    },
                    _ = wait_for_shutdown(&mut shutdown) => {
                        info!("change source stopped");
                        return;
                    }
                }
            }
            // streams are gone for good; poll from here on
            drop(changes);
            self.arm_polling();
        }

        self.poll_loop(&tx, &mut shutdown).await;
    }

    async fn poll_loop(&self, tx: &mpsc::Sender<ChangeEvent>, shutdown: &mut watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = self.scheduler.sleep(self.config.poll_interval) => {}
                _ = wait_for_shutdown(shutdown) => {
                    info!("change source stopped");
                    return;
                }
            }

            for collection in &self.config.watched_collections {
                let batch = match self
                    .feed
                    .recent_updates(collection, self.config.poll_batch)
                    .await
                {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "poll query failed");
                        continue;
                    }
                };
                if batch.is_empty() {
                    continue;
                }
                if batch.len() >= self.config.poll_batch {
                    // no watermark: anything older than the newest N is not re-sent
                    debug!(collection = %collection, batch = batch.len(), "poll batch full");
                }
                let ev = ChangeEvent::new(collection.clone(), OperationKind::Update, Value::Array(batch));
                if !forward(tx, ev, shutdown).await {
                    return;
                }
            }
        }
    }
}

/// Hand `ev` to the relay. A full channel never holds up shutdown; returns
/// `false` once the source should stop.
async fn forward(
    tx: &mpsc::Sender<ChangeEvent>,
    ev: ChangeEvent,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        sent = tx.send(ev) => {
            if sent.is_err() {
                debug!("change receiver dropped");
            }
            sent.is_ok()
        }
        _ = wait_for_shutdown(shutdown) => {
            info!("change source stopped");
            false
        }
    }
}

/// Resolves once shutdown is requested or the shutdown sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChangeError, Result};
    use async_trait::async_trait;
    use migii_core::scheduler::RecordingScheduler;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio_stream::wrappers::ReceiverStream;

    #[derive(Default)]
    struct FakeFeed {
        native: bool,
        fail_open: bool,
        streams: Mutex<HashMap<String, mpsc::Receiver<ChangeEvent>>>,
        recent: Mutex<HashMap<String, Vec<Value>>>,
        poll_calls: AtomicUsize,
        fail_first_poll: bool,
    }

    impl FakeFeed {
        fn with_recent(collection: &str, docs: Vec<Value>) -> Self {
            let feed = FakeFeed::default();
            feed.recent.lock().unwrap().insert(collection.into(), docs);
            feed
        }
    }

    #[async_trait]
    impl ChangeFeed for FakeFeed {
        async fn supports_change_streams(&self) -> bool {
            self.native
        }

        async fn open_stream(&self, collection: &str) -> Result<ChangeStream> {
            if self.fail_open {
                return Err(ChangeError::StreamUnavailable {
                    collection: collection.into(),
                    reason: "not a replica set".into(),
                });
            }
            let rx = self
                .streams
                .lock()
                .unwrap()
                .remove(collection)
                .ok_or_else(|| ChangeError::UnknownCollection(collection.into()))?;
            Ok(ReceiverStream::new(rx).boxed())
        }

        async fn recent_updates(&self, collection: &str, limit: usize) -> Result<Vec<Value>> {
            let n = self.poll_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_poll && n == 0 {
                return Err(ChangeError::Query("database is locked".into()));
            }
            let recent = self.recent.lock().unwrap();
            Ok(recent
                .get(collection)
                .map(|docs| docs.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }
    }

    fn config(collections: &[&str]) -> ChangeSourceConfig {
        ChangeSourceConfig {
            watched_collections: collections.iter().map(|c| c.to_string()).collect(),
            poll_interval: Duration::from_millis(5_000),
            poll_batch: 10,
        }
    }

    #[tokio::test]
    async fn unsupported_topology_polls_recent_batch() {
        let feed = Arc::new(FakeFeed::with_recent(
            "workers",
            vec![json!({"id": "w2"}), json!({"id": "w1"})],
        ));
        let scheduler = Arc::new(RecordingScheduler::with_budget(1));
        let source = ChangeSource::new(feed, config(&["workers"]), scheduler.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = async {
            source.run(tx, stop_rx).await;
        };
        let check = async {
            let ev = rx.recv().await.expect("one poll batch");
            assert_eq!(ev.collection, "workers");
            assert_eq!(ev.operation, OperationKind::Update);
            assert_eq!(ev.full_document, json!([{"id": "w2"}, {"id": "w1"}]));
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);

        assert_eq!(source.fallbacks_armed(), 1);
        assert_eq!(scheduler.delays()[0], Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn empty_batches_are_not_emitted() {
        let feed = Arc::new(FakeFeed::default());
        let scheduler = Arc::new(RecordingScheduler::with_budget(3));
        let source = ChangeSource::new(feed.clone(), config(&["jobs"]), scheduler.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = source.run(tx, stop_rx);
        let check = async {
            while scheduler.sleep_count() < 4 {
                tokio::task::yield_now().await;
            }
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);

        assert_eq!(feed.poll_calls.load(Ordering::SeqCst), 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_open_failure_arms_fallback_exactly_once() {
        let mut feed = FakeFeed::with_recent("workers", vec![json!({"id": "w1"})]);
        feed.native = true;
        feed.fail_open = true;
        let scheduler = Arc::new(RecordingScheduler::with_budget(3));
        let source = ChangeSource::new(Arc::new(feed), config(&["workers"]), scheduler.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = source.run(tx, stop_rx);
        let check = async {
            for _ in 0..3 {
                assert!(rx.recv().await.is_some());
            }
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);

        assert_eq!(source.fallbacks_armed(), 1);
    }

    #[tokio::test]
    async fn native_streams_are_relayed() {
        let mut feed = FakeFeed::default();
        feed.native = true;
        let (workers_tx, workers_rx) = mpsc::channel(4);
        let (jobs_tx, jobs_rx) = mpsc::channel(4);
        feed.streams.lock().unwrap().insert("workers".into(), workers_rx);
        feed.streams.lock().unwrap().insert("jobs".into(), jobs_rx);

        let scheduler = Arc::new(RecordingScheduler::new());
        let source = ChangeSource::new(Arc::new(feed), config(&["workers", "jobs"]), scheduler.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = source.run(tx, stop_rx);
        let check = async {
            workers_tx
                .send(ChangeEvent::new("workers", OperationKind::Insert, json!({"id": "w1"})))
                .await
                .unwrap();
            jobs_tx
                .send(ChangeEvent::new("jobs", OperationKind::Delete, json!({"id": "j1"})))
                .await
                .unwrap();
            let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
            seen.sort_by(|a, b| a.collection.cmp(&b.collection));
            assert_eq!(seen[0].operation, OperationKind::Delete);
            assert_eq!(seen[1].full_document["id"], "w1");
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);

        assert_eq!(source.fallbacks_armed(), 0);
        assert_eq!(scheduler.sleep_count(), 0);
    }

    #[tokio::test]
    async fn ended_streams_fall_back_to_polling_once() {
        let mut feed = FakeFeed::with_recent("workers", vec![json!({"id": "w1"})]);
        feed.native = true;
        let (workers_tx, workers_rx) = mpsc::channel(4);
        feed.streams.lock().unwrap().insert("workers".into(), workers_rx);
        drop(workers_tx);

        let scheduler = Arc::new(RecordingScheduler::with_budget(2));
        let source = ChangeSource::new(Arc::new(feed), config(&["workers"]), scheduler);
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = source.run(tx, stop_rx);
        let check = async {
            assert!(rx.recv().await.is_some());
            assert!(rx.recv().await.is_some());
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);

        assert_eq!(source.fallbacks_armed(), 1);
    }

    #[tokio::test]
    async fn poll_error_is_logged_and_loop_continues() {
        let mut feed = FakeFeed::with_recent("workers", vec![json!({"id": "w1"})]);
        feed.fail_first_poll = true;
        let scheduler = Arc::new(RecordingScheduler::with_budget(2));
        let source = ChangeSource::new(Arc::new(feed), config(&["workers"]), scheduler);
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = source.run(tx, stop_rx);
        let check = async {
            let ev = rx.recv().await.expect("second tick succeeds");
            assert_eq!(ev.full_document, json!([{"id": "w1"}]));
            stop_tx.send(true).unwrap();
        };
        tokio::join!(run, check);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_poll_send_to_a_full_relay() {
        let feed = FakeFeed::with_recent("workers", vec![json!({"id": "w1"})]);
        feed.recent.lock().unwrap().insert("jobs".into(), vec![json!({"id": "j1"})]);
        let feed = Arc::new(feed);
        let source = ChangeSource::new(
            feed.clone(),
            config(&["workers", "jobs"]),
            Arc::new(RecordingScheduler::with_budget(1)),
        );
        // nobody drains the relay, so the second batch has nowhere to go
        let (tx, _rx) = mpsc::channel(1);
        let relay = tx.clone();
        let (stop_tx, stop_rx) = watch::channel(false);

        let run = tokio::time::timeout(Duration::from_secs(1), source.run(tx, stop_rx));
        let check = async {
            while feed.poll_calls.load(Ordering::SeqCst) < 2 || relay.capacity() > 0 {
                tokio::task::yield_now().await;
            }
            stop_tx.send(true).unwrap();
        };
        let (finished, _) = tokio::join!(run, check);
        assert!(finished.is_ok(), "run should stop while the relay is full");
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_stream_send_to_a_full_relay() {
        let mut feed = FakeFeed::default();
        feed.native = true;
        let (workers_tx, workers_rx) = mpsc::channel(4);
        feed.streams.lock().unwrap().insert("workers".into(), workers_rx);
        let source = ChangeSource::new(
            Arc::new(feed),
            config(&["workers"]),
            Arc::new(RecordingScheduler::new()),
        );
        let (tx, _rx) = mpsc::channel(1);
        let relay = tx.clone();
        let (stop_tx, stop_rx) = watch::channel(false);

        for id in ["w1", "w2"] {
            workers_tx
                .send(ChangeEvent::new("workers", OperationKind::Insert, json!({"id": id})))
                .await
                .unwrap();
        }
        let run = tokio::time::timeout(Duration::from_secs(1), source.run(tx, stop_rx));
        let check = async {
            // both events taken off the stream, the first one fills the relay
            while workers_tx.capacity() < workers_tx.max_capacity() || relay.capacity() > 0 {
                tokio::task::yield_now().await;
            }
            stop_tx.send(true).unwrap();
        };
        let (finished, _) = tokio::join!(run, check);
        assert!(finished.is_ok(), "run should stop while the relay is full");
        assert_eq!(source.fallbacks_armed(), 0);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_the_loop() {
        let feed = Arc::new(FakeFeed::default());
        let source = ChangeSource::new(
            feed,
            config(&["workers"]),
            Arc::new(RecordingScheduler::with_budget(0)),
        );
        let (tx, _rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);
        tokio::time::timeout(Duration::from_secs(1), source.run(tx, stop_rx))
            .await
            .expect("run returns once shutdown sender is gone");
    }
}
