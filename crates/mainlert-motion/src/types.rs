use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One raw accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Milliseconds, monotonic or wall-clock. Only differences are used.
    pub timestamp_ms: u64,
    /// Acceleration including gravity (m/s^2).
    pub accel: Vec3,
}

impl RawSample {
    pub fn new(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self {
            timestamp_ms,
            accel: Vec3::new(x, y, z),
        }
    }

    /// False if any axis is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.accel.is_finite()
    }
}

/// Thresholds for one monitoring session. Read once at start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Linear magnitudes at or below this are treated as handling jitter.
    pub min_movement_threshold: f32,
    /// Rolling-average magnitude above this counts as vehicle-borne motion.
    pub vehicle_movement_threshold: f32,
    /// Accumulated movement that ends the session.
    pub mileage_limit: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_movement_threshold: 0.5,
            vehicle_movement_threshold: 3.0,
            mileage_limit: 1000.0,
        }
    }
}

/// Per-sample output of the classifier. Advisory: safe to drop or throttle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub timestamp_ms: u64,
    /// Acceleration with the gravity estimate removed.
    #[serde(with = "vec3_serde")]
    pub linear: Vec3,
    pub magnitude: f32,
    pub rolling_average: f32,
    pub total_movement: f32,
    pub is_vehicle_movement: bool,
    pub is_monitoring: bool,
}

/// The reading handed to the session controller when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalReading {
    pub total_movement: f32,
    pub is_vehicle_movement: bool,
    pub duration_ms: u64,
}

/// Why a monitoring session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// `stop` was requested.
    Stopped,
    /// Accumulated movement reached the mileage limit during vehicle movement.
    LimitReached,
}

/// Terminal message of a monitoring session. Must be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub reason: EndReason,
    pub reading: FinalReading,
}

/// Why a sample left the classifier untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session is active.
    Idle,
    /// The sample carried NaN or infinite values.
    NonFinite,
    /// An axis exceeded any physically plausible reading.
    OutOfRange,
}

/// Result of feeding one sample to the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Ignored(IgnoreReason),
    Classified(ClassificationEvent),
    /// Terminal: the session has already been stopped.
    LimitReached(ClassificationEvent, FinalReading),
}

impl IngestOutcome {
    /// The classification event, if the sample was processed.
    pub fn event(&self) -> Option<&ClassificationEvent> {
        match self {
            IngestOutcome::Ignored(_) => None,
            IngestOutcome::Classified(event) | IngestOutcome::LimitReached(event, _) => Some(event),
        }
    }

    pub fn is_limit_reached(&self) -> bool {
        matches!(self, IngestOutcome::LimitReached(..))
    }
}

// Keeps the JSON representation a plain array instead of glam's struct form.
mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}
