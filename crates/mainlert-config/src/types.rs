use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Movement detection thresholds.
    pub motion: MotionConfig,
    /// Mileage alert behavior.
    pub notifications: NotificationConfig,
    /// Where service records and readings are kept.
    pub store: StoreConfig,
}

impl AppConfig {
    /// The config as it is actually applied: motion values sanitized, the
    /// rest as loaded.
    pub fn effective(&self) -> Self {
        Self {
            motion: self.motion.effective(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Linear magnitudes at or below this are ignored (hand-held jitter).
    pub min_movement_threshold: f32,
    /// Rolling-average magnitude above this counts as vehicle movement.
    pub vehicle_movement_threshold: f32,
    /// Expected spacing between accelerometer samples.
    pub sampling_interval_ms: u64,
    /// Minimum spacing between live classification updates.
    pub publish_interval_ms: u64,
    /// Mileage limit for services that do not carry their own.
    pub default_mileage_limit: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_movement_threshold: 0.5,
            vehicle_movement_threshold: 3.0,
            sampling_interval_ms: 100,
            publish_interval_ms: 500,
            default_mileage_limit: 1000.0,
        }
    }
}

impl MotionConfig {
    /// Replace every non-positive or non-finite value with its default.
    pub fn effective(&self) -> Self {
        let defaults = Self::default();
        let positive = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let nonzero = |value: u64, fallback: u64| if value > 0 { value } else { fallback };

        Self {
            min_movement_threshold: positive(
                self.min_movement_threshold,
                defaults.min_movement_threshold,
            ),
            vehicle_movement_threshold: positive(
                self.vehicle_movement_threshold,
                defaults.vehicle_movement_threshold,
            ),
            sampling_interval_ms: nonzero(self.sampling_interval_ms, defaults.sampling_interval_ms),
            publish_interval_ms: nonzero(self.publish_interval_ms, defaults.publish_interval_ms),
            default_mileage_limit: positive(
                self.default_mileage_limit,
                defaults.default_mileage_limit,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Quiet period after a mileage alert before another one is shown.
    pub cooldown_minutes: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file. `None` means the platform data directory.
    pub path: Option<PathBuf>,
    /// Driver recorded on readings.
    pub user_id: Option<String>,
}
