//! Single-tracker announcer with a self-rescheduling loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{AnnounceDelegate, AnnounceError, AnnounceResult, RunningLoop, error_backoff};
use crate::config::AnnounceConfig;
use crate::torrent::tracker::{AnnounceEvent, TrackerClient, TrackerError};

/// Announcer bound to one tracker URL.
///
/// At most one loop runs at a time. The loop announces immediately on start,
/// then again after each granted interval, and streams every completed
/// attempt to the receiver returned by [`Self::start_loop`].
pub struct TrackerAnnouncer {
    inner: Arc<TrackerInner>,
    running: Mutex<Option<RunningLoop>>,
}

struct TrackerInner {
    client: Arc<dyn TrackerClient>,
    delegate: Arc<dyn AnnounceDelegate>,
    config: AnnounceConfig,
    last_interval: Mutex<Option<Duration>>,
}

impl TrackerAnnouncer {
    pub fn new(
        client: Arc<dyn TrackerClient>,
        delegate: Arc<dyn AnnounceDelegate>,
        config: AnnounceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                client,
                delegate,
                config,
                last_interval: Mutex::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        self.inner.client.tracker_url()
    }

    /// Interval granted by the most recent successful announce.
    pub fn last_interval(&self) -> Option<Duration> {
        *self.inner.last_interval.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Announces once, returning early with `TrackerError::Cancelled` if
    /// `cancel` fires while the request is in flight.
    pub async fn announce_once(
        &self,
        cancel: &CancellationToken,
        event: AnnounceEvent,
    ) -> AnnounceResult {
        self.inner.announce(cancel, event).await
    }

    /// Starts the announce loop with `event` as the first event.
    ///
    /// A second start while a loop is active is rejected instead of being
    /// ignored, so the caller never holds a receiver that nothing feeds. The
    /// active loop keeps running untouched.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::AlreadyRunning` - A loop is already active
    pub fn start_loop(
        &self,
        event: AnnounceEvent,
    ) -> Result<mpsc::Receiver<AnnounceResult>, AnnounceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AnnounceError::AlreadyRunning {
                what: format!("Tracker loop for {}", self.url()),
            });
        }

        let (results_tx, results_rx) = mpsc::channel(self.inner.config.result_buffer.max(1));
        let inner = Arc::clone(&self.inner);
        *running = Some(RunningLoop::spawn(move |cancel| {
            run_tracker_loop(inner, cancel, event, results_tx)
        }));

        tracing::debug!("Started announce loop for {}", self.url());
        Ok(results_rx)
    }

    /// Stops the loop and waits for it to exit. No-op when not running.
    pub async fn stop_loop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.shutdown().await;
            tracing::debug!("Stopped announce loop for {}", self.url());
        }
    }
}

impl TrackerInner {
    fn url(&self) -> &str {
        self.client.tracker_url()
    }

    async fn announce(&self, cancel: &CancellationToken, event: AnnounceEvent) -> AnnounceResult {
        let request = self.delegate.announce_request(event);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            outcome = self.client.announce(request) => outcome,
        };

        match &outcome {
            Ok(response) => {
                let interval = response
                    .interval
                    .max(response.min_interval.unwrap_or_default())
                    .max(self.config.min_interval);
                *self.last_interval.lock() = Some(interval);
                tracing::debug!(
                    "Announce {} to {} succeeded: {} seeders, {} leechers, next in {:?}",
                    event,
                    self.url(),
                    response.seeders,
                    response.leechers,
                    interval
                );
                self.delegate.on_announce_success(self.url(), event, response);
            }
            Err(TrackerError::Cancelled) => {
                tracing::debug!("Announce {} to {} cancelled", event, self.url());
            }
            Err(error) => {
                tracing::warn!("Announce {} to {} failed: {}", event, self.url(), error);
                self.delegate.on_announce_error(self.url(), event, error);
            }
        }

        AnnounceResult {
            tracker_url: self.url().to_string(),
            event,
            outcome,
            completed_at: Utc::now(),
        }
    }

    /// Wait before the next announce after `result`.
    fn next_wait(&self, result: &AnnounceResult, consecutive_errors: u32) -> Duration {
        let known = *self.last_interval.lock();
        match (&result.outcome, known) {
            (_, Some(interval)) => interval,
            (Ok(_), None) => self.config.default_interval,
            (Err(_), None) => error_backoff(consecutive_errors, self.config.default_interval),
        }
    }
}

async fn poll_in_flight(in_flight: &mut Option<BoxFuture<'static, AnnounceResult>>) -> AnnounceResult {
    match in_flight {
        Some(announce) => announce.await,
        None => std::future::pending().await,
    }
}

async fn run_tracker_loop(
    inner: Arc<TrackerInner>,
    cancel: CancellationToken,
    mut event: AnnounceEvent,
    results: mpsc::Sender<AnnounceResult>,
) {
    let capacity = inner.config.result_buffer.max(1);
    let mut pending: VecDeque<AnnounceResult> = VecDeque::with_capacity(capacity);
    let mut in_flight: Option<BoxFuture<'static, AnnounceResult>> = None;
    let mut next_announce = Instant::now();
    let mut consecutive_errors = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = poll_in_flight(&mut in_flight) => {
                in_flight = None;
                if result.is_cancelled() {
                    break;
                }

                if event == AnnounceEvent::Started {
                    event = AnnounceEvent::Regular;
                }
                if result.outcome.is_ok() {
                    consecutive_errors = 0;
                } else {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                }
                let wait = inner.next_wait(&result, consecutive_errors);
                next_announce = Instant::now() + wait;
                tracing::trace!("Next announce to {} in {:?}", inner.url(), wait);

                if pending.len() >= capacity {
                    pending.pop_front();
                    tracing::warn!("Result queue for {} full, dropping oldest", inner.url());
                }
                pending.push_back(result);
            }
            _ = tokio::time::sleep_until(next_announce), if in_flight.is_none() => {
                let inner = Arc::clone(&inner);
                let cancel = cancel.clone();
                in_flight = Some(Box::pin(async move { inner.announce(&cancel, event).await }));
            }
            permit = results.reserve(), if !pending.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(result) = pending.pop_front() {
                        permit.send(result);
                    }
                }
                Err(_) => pending.clear(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::AnnounceState;
    use crate::torrent::tracker::{
        AnnounceLog, AnnounceRequest, AnnounceResponse, ResponseConfig, SimulatedTrackerClient,
    };
    use crate::torrent::InfoHash;

    #[derive(Default)]
    struct CountingDelegate {
        successes: Mutex<u32>,
        errors: Mutex<u32>,
    }

    impl AnnounceDelegate for CountingDelegate {
        fn announce_request(&self, event: AnnounceEvent) -> AnnounceRequest {
            AnnounceRequest {
                info_hash: InfoHash::new([3; 20]),
                peer_id: [b'-'; 20],
                uploaded: 0,
                downloaded: 0,
                left: 0,
                event,
                ip: None,
                key: "K".to_string(),
                port: 6881,
                num_want: 50,
            }
        }

        fn on_announce_success(&self, _: &str, _: AnnounceEvent, _: &AnnounceResponse) {
            *self.successes.lock() += 1;
        }

        fn on_announce_error(&self, _: &str, _: AnnounceEvent, _: &TrackerError) {
            *self.errors.lock() += 1;
        }
    }

    fn announcer(
        fallback: ResponseConfig,
        script: Vec<ResponseConfig>,
    ) -> (TrackerAnnouncer, AnnounceLog, Arc<CountingDelegate>) {
        let log = AnnounceLog::new();
        let client = SimulatedTrackerClient::new("http://tracker/announce", fallback, log.clone())
            .with_script(script);
        let delegate = Arc::new(CountingDelegate::default());
        let announcer = TrackerAnnouncer::new(
            Arc::new(client),
            delegate.clone(),
            AnnounceConfig::default(),
        );
        (announcer, log, delegate)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_degrades_started_and_uses_interval() {
        let (announcer, log, delegate) = announcer(
            ResponseConfig::success(Duration::from_secs(60), 5, 5),
            vec![],
        );

        let mut results = announcer.start_loop(AnnounceEvent::Started).unwrap();
        let first = results.recv().await.unwrap();
        assert_eq!(first.event, AnnounceEvent::Started);
        assert_eq!(first.state(), AnnounceState::Alive);
        assert_eq!(announcer.last_interval(), Some(Duration::from_secs(60)));

        let second = results.recv().await.unwrap();
        assert_eq!(second.event, AnnounceEvent::Regular);

        announcer.stop_loop().await;
        assert_eq!(
            log.events_for("http://tracker/announce"),
            vec![AnnounceEvent::Started, AnnounceEvent::Regular]
        );
        assert_eq!(*delegate.successes.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_degrades_after_failure() {
        let (announcer, log, delegate) = announcer(
            ResponseConfig::success(Duration::from_secs(60), 1, 1),
            vec![ResponseConfig::failure("busy")],
        );

        let mut results = announcer.start_loop(AnnounceEvent::Started).unwrap();
        let first = results.recv().await.unwrap();
        assert_eq!(first.state(), AnnounceState::Dead);

        let before_retry = Instant::now();
        let second = results.recv().await.unwrap();
        assert_eq!(second.event, AnnounceEvent::Regular);
        assert_eq!(second.state(), AnnounceState::Alive);
        // First error with no known interval backs off for ten seconds
        assert!(Instant::now() - before_retry >= Duration::from_secs(10));

        announcer.stop_loop().await;
        assert_eq!(log.len(), 2);
        assert_eq!(*delegate.errors.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (announcer, _, _) = announcer(
            ResponseConfig::success(Duration::from_secs(60), 1, 1),
            vec![],
        );

        let mut first = announcer.start_loop(AnnounceEvent::Started).unwrap();
        assert!(matches!(
            announcer.start_loop(AnnounceEvent::Started),
            Err(AnnounceError::AlreadyRunning { .. })
        ));
        assert!(announcer.is_running());

        // The rejected start leaves the first loop feeding its receiver
        assert_eq!(first.recv().await.unwrap().event, AnnounceEvent::Started);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(first.recv().await.unwrap().event, AnnounceEvent::Regular);

        announcer.stop_loop().await;
        announcer.stop_loop().await;
        assert!(!announcer.is_running());

        // Restartable after stop
        let mut results = announcer.start_loop(AnnounceEvent::Started).unwrap();
        assert!(results.recv().await.is_some());
        announcer.stop_loop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_announce() {
        let log = AnnounceLog::new();
        let client = SimulatedTrackerClient::new(
            "http://slow/announce",
            ResponseConfig::success(Duration::from_secs(60), 1, 1),
            log.clone(),
        )
        .with_latency(Duration::from_secs(3600));
        let delegate = Arc::new(CountingDelegate::default());
        let announcer =
            TrackerAnnouncer::new(Arc::new(client), delegate.clone(), AnnounceConfig::default());

        let mut results = announcer.start_loop(AnnounceEvent::Started).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(log.len(), 1);

        announcer.stop_loop().await;
        assert!(results.recv().await.is_none());
        assert_eq!(*delegate.successes.lock(), 0);
        assert_eq!(*delegate.errors.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_once_cancelled() {
        let log = AnnounceLog::new();
        let client = SimulatedTrackerClient::new(
            "http://slow/announce",
            ResponseConfig::success(Duration::from_secs(60), 1, 1),
            log,
        )
        .with_latency(Duration::from_secs(3600));
        let announcer = TrackerAnnouncer::new(
            Arc::new(client),
            Arc::new(CountingDelegate::default()),
            AnnounceConfig::default(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = announcer.announce_once(&cancel, AnnounceEvent::Stopped).await;
        assert!(result.is_cancelled());
        assert_eq!(announcer.last_interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_floor_applied() {
        let (announcer, _, _) = announcer(
            ResponseConfig::success(Duration::from_secs(1), 1, 1),
            vec![],
        );
        let result = announcer
            .announce_once(&CancellationToken::new(), AnnounceEvent::Regular)
            .await;
        assert_eq!(result.interval(), Some(Duration::from_secs(1)));
        assert_eq!(
            announcer.last_interval(),
            Some(AnnounceConfig::default().min_interval)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_stall_announces() {
        let log = AnnounceLog::new();
        let client = SimulatedTrackerClient::new(
            "http://fast/announce",
            ResponseConfig::success(Duration::from_secs(10), 1, 1),
            log.clone(),
        );
        let config = AnnounceConfig {
            result_buffer: 2,
            min_interval: Duration::from_secs(1),
            ..AnnounceConfig::default()
        };
        let announcer =
            TrackerAnnouncer::new(Arc::new(client), Arc::new(CountingDelegate::default()), config);

        let mut results = announcer.start_loop(AnnounceEvent::Started).unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(log.len() >= 10);

        // Channel holds the first two results; the queue keeps only the newest
        let first = results.try_recv().unwrap();
        assert_eq!(first.event, AnnounceEvent::Started);
        assert!(results.try_recv().is_ok());
        assert!(results.try_recv().is_err());

        let queued = results.recv().await.unwrap();
        assert_eq!(queued.event, AnnounceEvent::Regular);
        assert!(queued.completed_at >= first.completed_at);
        announcer.stop_loop().await;
    }
}
