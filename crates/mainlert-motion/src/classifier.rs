use crate::filter::GravityFilter;
use crate::types::{
    ClassificationEvent, ClassifierConfig, FinalReading, IgnoreReason, IngestOutcome, RawSample,
};
use glam::Vec3;
use std::collections::VecDeque;
use std::time::Instant;

/// Number of recent magnitudes kept for the rolling average.
pub const MOVEMENT_BUFFER_CAPACITY: usize = 100;

/// Largest per-axis reading accepted (m/s^2), roughly 1000 g.
pub const MAX_ABS_ACCEL: f32 = 1.0e4;

/// Movement classifier and accumulator for one monitoring session.
///
/// Removes gravity from each accelerometer sample, accumulates linear
/// magnitudes above the noise floor into a running total, classifies the
/// rolling average as vehicle or human motion, and ends the session once
/// the total reaches the mileage limit while moving with a vehicle.
pub struct MotionClassifier {
    config: ClassifierConfig,
    filter: GravityFilter,
    buffer: VecDeque<f32>,
    total_movement: f32,
    is_vehicle_movement: bool,
    state: SessionState,
}

enum SessionState {
    /// Holds the duration of the last session, reported by repeated `stop` calls.
    Idle { last_duration_ms: u64 },
    Monitoring { started: Instant },
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::default(),
            filter: GravityFilter::new(),
            buffer: VecDeque::with_capacity(MOVEMENT_BUFFER_CAPACITY + 1),
            total_movement: 0.0,
            is_vehicle_movement: false,
            state: SessionState::Idle {
                last_duration_ms: 0,
            },
        }
    }

    /// Begin a session from a previously persisted total.
    ///
    /// Does nothing while a session is already running, so a repeated start
    /// cannot wipe the gravity estimate or the running total.
    pub fn start(&mut self, seed_total: f32, config: ClassifierConfig) {
        if self.is_monitoring() {
            tracing::warn!("Already monitoring, ignoring start");
            return;
        }

        let seed = if seed_total.is_finite() && seed_total >= 0.0 {
            seed_total
        } else {
            tracing::warn!(seed_total, "Unusable seed total, starting from zero");
            0.0
        };

        self.config = config;
        self.filter.reset();
        self.buffer.clear();
        self.is_vehicle_movement = false;
        self.total_movement = seed;
        self.state = SessionState::Monitoring {
            started: Instant::now(),
        };

        tracing::info!(
            seed_total = seed,
            min_threshold = config.min_movement_threshold,
            vehicle_threshold = config.vehicle_movement_threshold,
            mileage_limit = config.mileage_limit,
            "Monitoring started"
        );
    }

    /// Process one sample.
    ///
    /// Samples arriving while idle are ignored. A `LimitReached` outcome has
    /// already stopped the session, so it is returned at most once per start.
    pub fn ingest(&mut self, sample: &RawSample) -> IngestOutcome {
        if !self.is_monitoring() {
            return IngestOutcome::Ignored(IgnoreReason::Idle);
        }
        if !sample.is_finite() {
            tracing::trace!(timestamp_ms = sample.timestamp_ms, "Dropping non-finite sample");
            return IngestOutcome::Ignored(IgnoreReason::NonFinite);
        }
        if sample.accel.abs().max_element() > MAX_ABS_ACCEL {
            tracing::trace!(timestamp_ms = sample.timestamp_ms, "Dropping out-of-range sample");
            return IngestOutcome::Ignored(IgnoreReason::OutOfRange);
        }

        let linear = self.filter.update(sample.accel);
        let magnitude = linear.length();

        self.buffer.push_back(magnitude);
        if self.buffer.len() > MOVEMENT_BUFFER_CAPACITY {
            self.buffer.pop_front();
        }

        if magnitude > self.config.min_movement_threshold {
            self.total_movement += magnitude;
        }

        let rolling_average = self.rolling_average();
        let vehicle_threshold = self.config.vehicle_movement_threshold;
        self.is_vehicle_movement = vehicle_threshold > 0.0 && rolling_average > vehicle_threshold;

        let event = ClassificationEvent {
            timestamp_ms: sample.timestamp_ms,
            linear,
            magnitude,
            rolling_average,
            total_movement: self.total_movement,
            is_vehicle_movement: self.is_vehicle_movement,
            is_monitoring: true,
        };

        if self.limit_reached() {
            tracing::info!(
                total_movement = self.total_movement,
                mileage_limit = self.config.mileage_limit,
                "Mileage limit reached"
            );
            let reading = self.stop();
            return IngestOutcome::LimitReached(
                ClassificationEvent {
                    is_monitoring: false,
                    ..event
                },
                reading,
            );
        }

        IngestOutcome::Classified(event)
    }

    /// End the session and return the reading to persist.
    ///
    /// Safe to call repeatedly; the total is handed off, not cleared.
    pub fn stop(&mut self) -> FinalReading {
        if let SessionState::Monitoring { started } = self.state {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.state = SessionState::Idle {
                last_duration_ms: duration_ms,
            };
            tracing::info!(
                total_movement = self.total_movement,
                duration_ms,
                "Monitoring stopped"
            );
        }

        FinalReading {
            total_movement: self.total_movement,
            is_vehicle_movement: self.is_vehicle_movement,
            duration_ms: self.last_duration_ms(),
        }
    }

    /// Zero the accumulator. Leaves the session state as it is.
    pub fn reset(&mut self) {
        self.total_movement = 0.0;
        self.buffer.clear();
        self.is_vehicle_movement = false;
        tracing::info!(monitoring = self.is_monitoring(), "Movement total reset");
    }

    pub fn is_monitoring(&self) -> bool {
        matches!(self.state, SessionState::Monitoring { .. })
    }

    pub fn total_movement(&self) -> f32 {
        self.total_movement
    }

    pub fn is_vehicle_movement(&self) -> bool {
        self.is_vehicle_movement
    }

    /// Mean of the buffered magnitudes, zero when empty.
    pub fn rolling_average(&self) -> f32 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<f32>() / self.buffer.len() as f32
    }

    /// Number of magnitudes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn gravity(&self) -> Vec3 {
        self.filter.gravity()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn limit_reached(&self) -> bool {
        let limit = self.config.mileage_limit;
        self.is_vehicle_movement && limit > 0.0 && self.total_movement >= limit
    }

    fn last_duration_ms(&self) -> u64 {
        match self.state {
            SessionState::Idle { last_duration_ms } => last_duration_ms,
            SessionState::Monitoring { started } => started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}
