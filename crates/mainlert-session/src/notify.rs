use mainlert_motion::types::FinalReading;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A service reached its mileage limit while the vehicle was moving.
#[derive(Debug, Clone, PartialEq)]
pub struct MileageAlert {
    pub service_id: String,
    pub vehicle_id: Option<String>,
    pub mileage_limit: f32,
    pub reading: FinalReading,
}

impl MileageAlert {
    /// User-facing text for the alert.
    pub fn message(&self) -> String {
        match &self.vehicle_id {
            Some(vehicle) => format!(
                "Vehicle {vehicle} needs service: {:.1} of {:.1} reached",
                self.reading.total_movement, self.mileage_limit
            ),
            None => format!(
                "Service {} is due: {:.1} of {:.1} reached",
                self.service_id, self.reading.total_movement, self.mileage_limit
            ),
        }
    }
}

/// Receives mileage alerts from the session controller.
///
/// Called from a tokio task; implementations must not block for long.
pub trait Notifier: Send + Sync {
    fn mileage_limit_reached(&self, alert: &MileageAlert);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn mileage_limit_reached(&self, alert: &MileageAlert) {
        tracing::warn!(
            service_id = %alert.service_id,
            vehicle_id = ?alert.vehicle_id,
            total_movement = alert.reading.total_movement,
            mileage_limit = alert.mileage_limit,
            "{}",
            alert.message()
        );
    }
}

/// Forwards alerts to a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    alert_tx: mpsc::UnboundedSender<MileageAlert>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MileageAlert>) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        (Self { alert_tx }, alert_rx)
    }
}

impl Notifier for ChannelNotifier {
    fn mileage_limit_reached(&self, alert: &MileageAlert) {
        if self.alert_tx.send(alert.clone()).is_err() {
            tracing::debug!("Alert receiver dropped");
        }
    }
}

/// Suppresses alerts that follow a shown one within `cooldown`.
pub struct CooldownNotifier<N> {
    inner: N,
    cooldown: Duration,
    last_shown: Mutex<Option<Instant>>,
}

impl<N: Notifier> CooldownNotifier<N> {
    pub fn new(inner: N, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            last_shown: Mutex::new(None),
        }
    }

    pub fn from_minutes(inner: N, minutes: u64) -> Self {
        Self::new(inner, Duration::from_secs(minutes * 60))
    }

    /// Claim the alert slot. True if an alert may be shown now.
    fn claim(&self, now: Instant) -> bool {
        let Ok(mut last_shown) = self.last_shown.lock() else {
            // A poisoned lock should never silence an alert.
            return true;
        };
        match *last_shown {
            Some(last) if now.duration_since(last) < self.cooldown => false,
            _ => {
                *last_shown = Some(now);
                true
            }
        }
    }
}

impl<N: Notifier> Notifier for CooldownNotifier<N> {
    fn mileage_limit_reached(&self, alert: &MileageAlert) {
        if self.claim(Instant::now()) {
            self.inner.mileage_limit_reached(alert);
        } else {
            tracing::debug!(service_id = %alert.service_id, "Mileage alert within cooldown, suppressed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(vehicle_id: Option<&str>) -> MileageAlert {
        MileageAlert {
            service_id: "svc".to_string(),
            vehicle_id: vehicle_id.map(str::to_string),
            mileage_limit: 1000.0,
            reading: FinalReading {
                total_movement: 1004.0,
                is_vehicle_movement: true,
                duration_ms: 5_000,
            },
        }
    }

    #[test]
    fn cooldown_suppresses_repeats() {
        let (channel, mut alert_rx) = ChannelNotifier::new();
        let notifier = CooldownNotifier::from_minutes(channel, 30);

        notifier.mileage_limit_reached(&alert(None));
        notifier.mileage_limit_reached(&alert(None));

        assert!(alert_rx.try_recv().is_ok());
        assert!(alert_rx.try_recv().is_err());
    }

    #[test]
    fn cooldown_expires() {
        let (channel, _alert_rx) = ChannelNotifier::new();
        let notifier = CooldownNotifier::new(channel, Duration::from_secs(60));
        let start = Instant::now();

        assert!(notifier.claim(start));
        assert!(!notifier.claim(start + Duration::from_secs(59)));
        assert!(notifier.claim(start + Duration::from_secs(61)));
    }

    #[test]
    fn zero_cooldown_passes_everything() {
        let (channel, mut alert_rx) = ChannelNotifier::new();
        let notifier = CooldownNotifier::new(channel, Duration::ZERO);

        notifier.mileage_limit_reached(&alert(None));
        notifier.mileage_limit_reached(&alert(None));

        assert!(alert_rx.try_recv().is_ok());
        assert!(alert_rx.try_recv().is_ok());
    }

    #[test]
    fn message_names_vehicle_when_known() {
        assert!(alert(Some("truck-7")).message().starts_with("Vehicle truck-7"));
        assert!(alert(None).message().contains("Service svc"));
    }
}
