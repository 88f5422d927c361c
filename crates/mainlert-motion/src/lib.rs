pub mod classifier;
pub mod filter;
pub mod source;
pub mod types;

use classifier::MotionClassifier;
use tokio::sync::{mpsc, watch};
use types::{ClassificationEvent, ClassifierConfig, EndReason, IngestOutcome, RawSample, SessionEnd};

/// Default spacing between published classification events (sample time).
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 500;

/// Messages processed by the monitoring task, strictly in arrival order.
enum MonitorMessage {
    Sample(RawSample),
    Reset,
    Stop,
}

/// Cloneable handle for pushing samples, usable from sensor callback threads.
#[derive(Clone)]
pub struct SampleSink {
    message_tx: mpsc::UnboundedSender<MonitorMessage>,
}

impl SampleSink {
    /// Queue a sample. Returns `false` once the session has ended; late
    /// samples are dropped.
    pub fn push(&self, sample: RawSample) -> bool {
        self.message_tx.send(MonitorMessage::Sample(sample)).is_ok()
    }
}

/// One monitoring session running on its own task.
///
/// Owns a single `MotionClassifier`, so samples from any number of producer
/// threads are serialized through one channel. Publishes throttled
/// classification events for display and delivers exactly one `SessionEnd`.
pub struct MotionMonitor {
    message_tx: mpsc::UnboundedSender<MonitorMessage>,
    event_rx: watch::Receiver<Option<ClassificationEvent>>,
    end_rx: watch::Receiver<Option<SessionEnd>>,
    _task: tokio::task::JoinHandle<()>,
}

impl MotionMonitor {
    /// Start a session seeded with the last persisted total.
    ///
    /// The classifier is started before this returns, so no sample can be
    /// accumulated against an unseeded total.
    pub fn spawn(seed_total: f32, config: ClassifierConfig, publish_interval_ms: u64) -> Self {
        let mut classifier = MotionClassifier::new();
        classifier.start(seed_total, config);

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = watch::channel(None);
        let (end_tx, end_rx) = watch::channel(None);

        let task = tokio::spawn(monitor_loop(
            classifier,
            message_rx,
            event_tx,
            end_tx,
            publish_interval_ms,
        ));

        Self {
            message_tx,
            event_rx,
            end_rx,
            _task: task,
        }
    }

    /// Handle for the sample source.
    pub fn sink(&self) -> SampleSink {
        SampleSink {
            message_tx: self.message_tx.clone(),
        }
    }

    /// Latest published classification (non-blocking).
    pub fn latest(&self) -> Option<ClassificationEvent> {
        *self.event_rx.borrow()
    }

    /// Subscribe to published classifications.
    pub fn events(&self) -> watch::Receiver<Option<ClassificationEvent>> {
        self.event_rx.clone()
    }

    /// Zero the running total. Ordered after every sample already queued.
    pub fn reset(&self) {
        let _ = self.message_tx.send(MonitorMessage::Reset);
    }

    /// Whether the session is still accepting samples.
    pub fn is_running(&self) -> bool {
        !self.message_tx.is_closed()
    }

    /// Receiver that holds the session end once it happens.
    pub fn ended(&self) -> watch::Receiver<Option<SessionEnd>> {
        self.end_rx.clone()
    }

    /// Stop the session and wait for its final reading.
    ///
    /// If the limit was already reached, that end is returned instead.
    pub async fn stop(&self) -> Option<SessionEnd> {
        let _ = self.message_tx.send(MonitorMessage::Stop);
        self.finished().await
    }

    /// Wait until the session ends, by `stop` or by reaching the limit.
    pub async fn finished(&self) -> Option<SessionEnd> {
        wait_for_end(self.ended()).await
    }
}

/// Wait for a session end published on `end_rx`.
///
/// Returns `None` only if the monitoring task went away without one.
pub async fn wait_for_end(mut end_rx: watch::Receiver<Option<SessionEnd>>) -> Option<SessionEnd> {
    match end_rx.wait_for(Option::is_some).await {
        Ok(end) => *end,
        Err(_) => None,
    }
}

/// Background task: classify samples in order, publish events, report the end.
async fn monitor_loop(
    mut classifier: MotionClassifier,
    mut message_rx: mpsc::UnboundedReceiver<MonitorMessage>,
    event_tx: watch::Sender<Option<ClassificationEvent>>,
    end_tx: watch::Sender<Option<SessionEnd>>,
    publish_interval_ms: u64,
) {
    let mut last_publish_ms: Option<u64> = None;
    let mut sample_count: u64 = 0;

    let end = loop {
        let Some(message) = message_rx.recv().await else {
            tracing::debug!("Monitor handle dropped, stopping session");
            break SessionEnd {
                reason: EndReason::Stopped,
                reading: classifier.stop(),
            };
        };

        match message {
            MonitorMessage::Sample(sample) => {
                sample_count += 1;
                if sample_count % 1000 == 0 {
                    tracing::debug!(
                        sample_count,
                        total_movement = classifier.total_movement(),
                        "Motion samples processed"
                    );
                }

                match classifier.ingest(&sample) {
                    IngestOutcome::Ignored(reason) => {
                        tracing::trace!(?reason, "Sample ignored");
                    }
                    IngestOutcome::Classified(event) => {
                        let due = last_publish_ms.map_or(true, |last| {
                            event.timestamp_ms.abs_diff(last) > publish_interval_ms
                        });
                        if due {
                            let _ = event_tx.send(Some(event));
                            last_publish_ms = Some(event.timestamp_ms);
                        }
                    }
                    IngestOutcome::LimitReached(event, reading) => {
                        let _ = event_tx.send(Some(event));
                        break SessionEnd {
                            reason: EndReason::LimitReached,
                            reading,
                        };
                    }
                }
            }
            MonitorMessage::Reset => {
                classifier.reset();
                event_tx.send_modify(|latest| {
                    if let Some(event) = latest {
                        event.total_movement = 0.0;
                        event.rolling_average = 0.0;
                        event.is_vehicle_movement = false;
                    }
                });
            }
            MonitorMessage::Stop => {
                let reading = classifier.stop();
                event_tx.send_modify(|latest| {
                    if let Some(event) = latest {
                        event.is_monitoring = false;
                        event.total_movement = reading.total_movement;
                    }
                });
                break SessionEnd {
                    reason: EndReason::Stopped,
                    reading,
                };
            }
        }
    };

    // Refuse anything still queued or arriving late.
    message_rx.close();

    tracing::info!(
        reason = ?end.reason,
        total_movement = end.reading.total_movement,
        sample_count,
        "Monitoring session ended"
    );
    if end_tx.send(Some(end)).is_err() {
        tracing::warn!("Session end had no receiver");
    }
}
