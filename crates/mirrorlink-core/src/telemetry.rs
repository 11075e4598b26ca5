//! Telemetry queue and batcher
//!
//! Producers push `(key, value)` entries from any thread through a
//! [`TelemetrySender`]. The [`TelemetryBatcher`] drains them in arrival order
//! and hands each one to a [`CommandSink`]; [`TelemetryScheduler`] runs the
//! batcher on a fixed cadence while sending is enabled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::codec::Command;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};

/// One queued telemetry value
pub type TelemetryEntry = Command;

// ----------------------------------------------------------------------------
// Collaborator Traits
// ----------------------------------------------------------------------------

/// Destination for drained entries, normally a [`LinkHandle`](crate::LinkHandle)
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn deliver(&self, command: Command) -> Result<()>;
}

#[async_trait]
impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    async fn deliver(&self, command: Command) -> Result<()> {
        (**self).deliver(command).await
    }
}

/// Supplies the display name re-sent with every batch
pub trait IdentitySource: Send + Sync {
    fn display_name(&self) -> String;
}

impl<F> IdentitySource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn display_name(&self) -> String {
        self()
    }
}

// ----------------------------------------------------------------------------
// Queue
// ----------------------------------------------------------------------------

/// Producer side of the telemetry queue
#[derive(Debug, Clone)]
pub struct TelemetrySender {
    tx: mpsc::UnboundedSender<TelemetryEntry>,
}

impl TelemetrySender {
    /// Append an entry; never blocks and is safe from any thread
    pub fn push(&self, key: impl Into<String>, value: impl Into<String>) {
        self.push_entry(Command::new(key, value));
    }

    pub fn push_entry(&self, entry: TelemetryEntry) {
        if self.tx.send(entry).is_err() {
            debug!("Telemetry queue gone, dropping entry");
        }
    }

    /// Callback for producers that deliver a bare value for a fixed key
    pub fn callback(&self, key: impl Into<String>) -> impl Fn(String) + Send + Sync + 'static {
        let sender = self.clone();
        let key = key.into();
        move |value| sender.push(key.clone(), value)
    }
}

/// FIFO of entries waiting for the next flush
///
/// Pushes arrive over a channel, so a drain never observes a partially
/// appended entry and appends never race a clear.
#[derive(Debug)]
pub struct TelemetryQueue {
    rx: mpsc::UnboundedReceiver<TelemetryEntry>,
    pending: Vec<TelemetryEntry>,
}

impl TelemetryQueue {
    pub fn new() -> (TelemetrySender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TelemetrySender { tx },
            Self {
                rx,
                pending: Vec::new(),
            },
        )
    }

    fn collect(&mut self) {
        while let Ok(entry) = self.rx.try_recv() {
            self.pending.push(entry);
        }
    }

    /// Append after everything that has already arrived
    pub fn push(&mut self, entry: TelemetryEntry) {
        self.collect();
        self.pending.push(entry);
    }

    /// Take every queued entry in arrival order
    pub fn drain(&mut self) -> Vec<TelemetryEntry> {
        self.collect();
        std::mem::take(&mut self.pending)
    }

    pub fn snapshot(&mut self) -> Vec<TelemetryEntry> {
        self.collect();
        self.pending.clone()
    }

    pub fn len(&mut self) -> usize {
        self.collect();
        self.pending.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Batcher
// ----------------------------------------------------------------------------

/// Outcome of one flush
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: Vec<(TelemetryEntry, MirrorError)>,
}

impl FlushReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed.len()
    }
}

/// Drains the queue into a sink, one command per entry
pub struct TelemetryBatcher<K> {
    sink: K,
    identity: Arc<dyn IdentitySource>,
    identity_key: String,
    queue: TelemetryQueue,
}

impl<K: CommandSink> TelemetryBatcher<K> {
    pub fn new(
        sink: K,
        identity: Arc<dyn IdentitySource>,
        config: &MirrorConfig,
    ) -> (TelemetrySender, Self) {
        let (sender, queue) = TelemetryQueue::new();
        let batcher = Self {
            sink,
            identity,
            identity_key: config.identity_key.clone(),
            queue,
        };
        (sender, batcher)
    }

    /// Queue a fresh identity entry
    pub fn seed_identity(&mut self) {
        let entry = Command::new(self.identity_key.clone(), self.identity.display_name());
        self.queue.push(entry);
    }

    /// Write every queued entry in order, then re-seed the identity entry
    ///
    /// A failed write is reported and the batch carries on; nothing is retried.
    pub async fn flush(&mut self) -> FlushReport {
        let batch = self.queue.drain();
        let mut report = FlushReport::default();

        for entry in batch {
            match self.sink.deliver(entry.clone()).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!("Failed to send telemetry {}: {}", entry.key, e);
                    report.failed.push((entry, e));
                }
            }
        }

        self.seed_identity();
        report
    }

    /// Entries that would go out with the next flush
    pub fn pending(&mut self) -> Vec<TelemetryEntry> {
        self.queue.snapshot()
    }

    /// Drop everything queued; returns how many entries were discarded
    pub fn discard_pending(&mut self) -> usize {
        self.queue.drain().len()
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Runs periodic flushes while telemetry sending is enabled
pub struct TelemetryScheduler<K> {
    batcher: Arc<Mutex<TelemetryBatcher<K>>>,
    initial_delay: Duration,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<K: CommandSink + 'static> TelemetryScheduler<K> {
    pub fn new(batcher: TelemetryBatcher<K>, config: &MirrorConfig) -> Self {
        Self {
            batcher: Arc::new(Mutex::new(batcher)),
            initial_delay: config.initial_flush_delay,
            interval: config.flush_interval,
            task: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.task.is_some()
    }

    /// Shared access to the batcher, e.g. for an on-demand flush
    pub fn batcher(&self) -> Arc<Mutex<TelemetryBatcher<K>>> {
        Arc::clone(&self.batcher)
    }

    /// Flush immediately, outside the cadence
    pub async fn flush_now(&self) -> FlushReport {
        self.batcher.lock().await.flush().await
    }

    /// Start or stop periodic sending
    ///
    /// Disabling cancels the cadence without a final flush and drops whatever
    /// is still queued.
    pub async fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.task.is_some() {
                return;
            }
            self.batcher.lock().await.seed_identity();

            let batcher = Arc::clone(&self.batcher);
            let mut ticker = interval_at(Instant::now() + self.initial_delay, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            self.task = Some(tokio::spawn(async move {
                loop {
                    ticker.tick().await;
                    let report = batcher.lock().await.flush().await;
                    debug!(
                        "Telemetry flush: {} sent, {} failed",
                        report.sent,
                        report.failed.len()
                    );
                }
            }));
            info!("Telemetry sending enabled");
        } else if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            let dropped = self.batcher.lock().await.discard_pending();
            info!("Telemetry sending disabled, {} queued entries dropped", dropped);
        }
    }
}

impl<K> Drop for TelemetryScheduler<K> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: StdMutex<Vec<Command>>,
        fail_key: Option<&'static str>,
    }

    impl RecordingSink {
        fn keys(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|c| c.key.clone()).collect()
        }
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn deliver(&self, command: Command) -> Result<()> {
            if self.fail_key == Some(command.key.as_str()) {
                return Err(MirrorError::TransportWriteFailed("write rejected".into()));
            }
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn identity() -> Arc<dyn IdentitySource> {
        Arc::new(|| "Alice".to_string())
    }

    fn config() -> MirrorConfig {
        MirrorConfig::default()
    }

    #[tokio::test]
    async fn test_flush_preserves_order_and_reseeds() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, mut batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());

        sender.push("A", "1");
        sender.push("B", "2");
        sender.push("C", "3");

        let report = batcher.flush().await;
        assert_eq!(report.sent, 3);
        assert_eq!(sink.keys(), vec!["A", "B", "C"]);
        assert_eq!(batcher.pending(), vec![Command::new("Name", "Alice")]);
    }

    #[tokio::test]
    async fn test_repeated_keys_are_not_deduplicated() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, mut batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());

        sender.push("Heart", "64");
        sender.push("Heart", "66");
        batcher.flush().await;
        batcher.flush().await;

        assert_eq!(sink.keys(), vec!["Heart", "Heart", "Name"]);
    }

    #[tokio::test]
    async fn test_failed_write_reported_and_batch_continues() {
        let sink = Arc::new(RecordingSink {
            fail_key: Some("B"),
            ..Default::default()
        });
        let (sender, mut batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());

        sender.push("A", "1");
        sender.push("B", "2");
        sender.push("C", "3");

        let report = batcher.flush().await;
        assert_eq!(report.sent, 2);
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.failed[0].0, Command::new("B", "2"));
        assert!(matches!(report.failed[0].1, MirrorError::TransportWriteFailed(_)));
        assert_eq!(sink.keys(), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_pushes_from_other_threads() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, mut batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let callback = sender.callback(format!("Metric{}", i));
                std::thread::spawn(move || {
                    for n in 0..25 {
                        callback(n.to_string());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let report = batcher.flush().await;
        assert_eq!(report.sent, 100);
        let sent = sink.sent.lock().unwrap();
        // Per-producer order survives interleaving
        let metric0: Vec<_> = sent
            .iter()
            .filter(|c| c.key == "Metric0")
            .map(|c| c.value.clone())
            .collect();
        assert_eq!(metric0, (0..25).map(|n| n.to_string()).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_initial_then_periodic() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());
        let mut scheduler = TelemetryScheduler::new(batcher, &config());

        scheduler.set_enabled(true).await;
        assert!(scheduler.is_enabled());

        // Initial flush after the short delay carries the seeded identity
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.keys(), vec!["Name"]);

        sender.push("Steps", "1200");
        sender.push("Heart", "64");
        sender.push("Calories", "310");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            sink.keys(),
            vec!["Name", "Name", "Steps", "Heart", "Calories"]
        );
        assert_eq!(
            scheduler.batcher().lock().await.pending(),
            vec![Command::new("Name", "Alice")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_without_final_flush() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, batcher) = TelemetryBatcher::new(Arc::clone(&sink), identity(), &config());
        let mut scheduler = TelemetryScheduler::new(batcher, &config());

        scheduler.set_enabled(true).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        sender.push("TempF", "71");

        scheduler.set_enabled(false).await;
        assert!(!scheduler.is_enabled());
        assert!(scheduler.batcher().lock().await.pending().is_empty());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(sink.keys(), vec!["Name"]);

        // The queue still accepts pushes while disabled
        sender.push("Humid", "40");
        assert_eq!(scheduler.batcher().lock().await.pending().len(), 1);
    }
}
