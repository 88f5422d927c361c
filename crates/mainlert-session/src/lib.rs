pub mod notify;

use anyhow::{anyhow, Context, Result};
use mainlert_config::MotionConfig;
use mainlert_motion::types::{ClassificationEvent, ClassifierConfig, EndReason, SessionEnd};
use mainlert_motion::{wait_for_end, MotionMonitor, SampleSink};
use mainlert_store::{now_ms, ServiceReading, ServiceStatusSummary, ServiceStore};
use notify::{MileageAlert, Notifier};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a monitoring session finished, and what was written for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub end: SessionEnd,
    /// The stored reading, or `None` when there was nothing to record.
    pub reading: Option<ServiceReading>,
}

/// Runs monitoring sessions for services kept in a `ServiceStore`.
///
/// Reads the seed total and mileage limit when a session starts, then writes
/// the single final reading and raises the mileage alert when it ends. Store
/// writes run on the blocking pool so the monitor task never waits on IO.
pub struct SessionController {
    store: Arc<dyn ServiceStore>,
    notifier: Arc<dyn Notifier>,
    motion: MotionConfig,
    user_id: String,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        notifier: Arc<dyn Notifier>,
        motion: &MotionConfig,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            motion: motion.effective(),
            user_id: user_id.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    /// Begin monitoring `service_id`, seeded with its stored total.
    ///
    /// `vehicle_id` defaults to the first vehicle on the service record.
    /// Fails while another session on the same service has not finished.
    pub async fn start(&self, service_id: &str, vehicle_id: Option<&str>) -> Result<ActiveSession> {
        let store = self.store.clone();
        let id = service_id.to_string();
        let service = tokio::task::spawn_blocking(move || -> Result<_> {
            let service = store
                .service(&id)?
                .ok_or_else(|| anyhow!("Unknown service {id}"))?;
            store.start_monitoring(&id)?;
            Ok(service)
        })
        .await??;

        let mileage_limit = if service.mileage_limit > 0.0 {
            service.mileage_limit
        } else {
            self.motion.default_mileage_limit
        };
        let config = ClassifierConfig {
            min_movement_threshold: self.motion.min_movement_threshold,
            vehicle_movement_threshold: self.motion.vehicle_movement_threshold,
            mileage_limit,
        };
        let vehicle_id = vehicle_id
            .map(str::to_string)
            .or_else(|| service.vehicle_id().map(str::to_string));

        info!(
            service_id,
            ?vehicle_id,
            seed = service.total_movement,
            mileage_limit,
            "Starting monitoring session"
        );

        let monitor = MotionMonitor::spawn(
            service.total_movement,
            config,
            self.motion.publish_interval_ms,
        );

        let completion = tokio::spawn(complete_session(
            SessionRecord {
                store: self.store.clone(),
                notifier: self.notifier.clone(),
                service_id: service.id.clone(),
                vehicle_id: vehicle_id.clone(),
                user_id: self.user_id.clone(),
                seed_total: service.total_movement,
                mileage_limit,
            },
            monitor.ended(),
        ));

        Ok(ActiveSession {
            service_id: service.id,
            vehicle_id,
            monitor,
            completion,
        })
    }

    /// Delete a service's readings and zero its total.
    pub async fn reset_service(&self, service_id: &str) -> Result<()> {
        let store = self.store.clone();
        let id = service_id.to_string();
        tokio::task::spawn_blocking(move || store.reset_readings(&id)).await??;
        info!(service_id, "Service readings reset");
        Ok(())
    }

    /// Clear a monitoring flag left set by a session that never finished,
    /// such as one cut off by a crash. Not for use while a session is running.
    pub async fn release_monitoring(&self, service_id: &str) -> Result<()> {
        let store = self.store.clone();
        let id = service_id.to_string();
        tokio::task::spawn_blocking(move || store.stop_monitoring(&id)).await??;
        warn!(service_id, "Released stale monitoring flag");
        Ok(())
    }

    pub async fn status(&self, service_id: &str) -> Result<ServiceStatusSummary> {
        let store = self.store.clone();
        let id = service_id.to_string();
        tokio::task::spawn_blocking(move || store.status_summary(&id)).await?
    }
}

/// A running session. Dropping it does not stop monitoring while sample
/// sinks are still alive; call `stop`.
pub struct ActiveSession {
    service_id: String,
    vehicle_id: Option<String>,
    monitor: MotionMonitor,
    completion: tokio::task::JoinHandle<Result<SessionOutcome>>,
}

impl ActiveSession {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn vehicle_id(&self) -> Option<&str> {
        self.vehicle_id.as_deref()
    }

    /// Handle for feeding accelerometer samples.
    pub fn sample_sink(&self) -> SampleSink {
        self.monitor.sink()
    }

    /// Latest throttled classification.
    pub fn latest(&self) -> Option<ClassificationEvent> {
        self.monitor.latest()
    }

    pub fn updates(&self) -> watch::Receiver<Option<ClassificationEvent>> {
        self.monitor.events()
    }

    /// Zero the running total of this session. The stored total follows
    /// when the session ends.
    pub fn reset(&self) {
        self.monitor.reset();
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// End the session and wait for its reading to be stored.
    pub async fn stop(self) -> Result<SessionOutcome> {
        self.monitor.stop().await;
        self.completion.await?
    }

    /// Wait for the session to end on its own (mileage limit).
    pub async fn finished(self) -> Result<SessionOutcome> {
        self.completion.await?
    }
}

/// What the completion task needs to record a session end.
struct SessionRecord {
    store: Arc<dyn ServiceStore>,
    notifier: Arc<dyn Notifier>,
    service_id: String,
    vehicle_id: Option<String>,
    user_id: String,
    seed_total: f32,
    mileage_limit: f32,
}

/// Background task: wait for the session end, alert, then persist.
async fn complete_session(
    record: SessionRecord,
    end_rx: watch::Receiver<Option<SessionEnd>>,
) -> Result<SessionOutcome> {
    let end = wait_for_end(end_rx)
        .await
        .ok_or_else(|| anyhow!("Monitor for {} ended without a reading", record.service_id))?;

    if end.reason == EndReason::LimitReached {
        record.notifier.mileage_limit_reached(&MileageAlert {
            service_id: record.service_id.clone(),
            vehicle_id: record.vehicle_id.clone(),
            mileage_limit: record.mileage_limit,
            reading: end.reading,
        });
    }

    let service_id = record.service_id.clone();
    let reading = tokio::task::spawn_blocking(move || persist_end(&record, &end))
        .await?
        .with_context(|| format!("saving final reading of {service_id}"));

    match reading {
        Ok(reading) => {
            info!(
                %service_id,
                reason = ?end.reason,
                total_movement = end.reading.total_movement,
                "Session recorded"
            );
            Ok(SessionOutcome { end, reading })
        }
        Err(e) => {
            error!(?e, %service_id, "Failed to record session");
            Err(e)
        }
    }
}

/// Write the final reading (if any) and clear the monitoring flag.
fn persist_end(record: &SessionRecord, end: &SessionEnd) -> Result<Option<ServiceReading>> {
    // Skip only empty sessions on empty services; a reset to zero must still
    // reach the store.
    let reading = if end.reading.total_movement > 0.0 || record.seed_total > 0.0 {
        Some(record.store.add_reading(ServiceReading {
            id: String::new(),
            service_id: record.service_id.clone(),
            user_id: record.user_id.clone(),
            timestamp: now_ms(),
            total_movement: end.reading.total_movement,
            duration_ms: end.reading.duration_ms,
            is_vehicle_movement: end.reading.is_vehicle_movement,
            is_completed: true,
        })?)
    } else {
        debug!(service_id = %record.service_id, "No movement recorded, skipping reading");
        None
    };

    record.store.stop_monitoring(&record.service_id)?;
    Ok(reading)
}
