use crate::data::StoreData;
use crate::{ServiceReading, ServiceRecord, ServiceStore};
use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<MutexGuard<'_, StoreData>> {
        self.data.lock().map_err(|_| anyhow!("Store lock poisoned"))
    }
}

impl ServiceStore for MemoryStore {
    fn service(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        Ok(self.data()?.service(service_id))
    }

    fn put_service(&self, service: ServiceRecord) -> Result<()> {
        self.data()?.put_service(service);
        Ok(())
    }

    fn start_monitoring(&self, service_id: &str) -> Result<()> {
        self.data()?.start_monitoring(service_id)
    }

    fn stop_monitoring(&self, service_id: &str) -> Result<()> {
        self.data()?.stop_monitoring(service_id)
    }

    fn add_reading(&self, reading: ServiceReading) -> Result<ServiceReading> {
        self.data()?.add_reading(reading)
    }

    fn readings(&self, service_id: &str) -> Result<Vec<ServiceReading>> {
        Ok(self.data()?.readings(service_id))
    }

    fn reset_readings(&self, service_id: &str) -> Result<()> {
        self.data()?.reset_readings(service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceStatus;

    fn reading(service_id: &str, timestamp: u64, total: f32) -> ServiceReading {
        ServiceReading {
            id: String::new(),
            service_id: service_id.to_string(),
            user_id: "driver".to_string(),
            timestamp,
            total_movement: total,
            duration_ms: 1000,
            is_vehicle_movement: true,
            is_completed: true,
        }
    }

    #[test]
    fn reading_sets_absolute_total() {
        let store = MemoryStore::new();
        store.put_service(ServiceRecord::new("svc", 1000.0)).unwrap();

        let first = store.add_reading(reading("svc", 10, 120.0)).unwrap();
        let second = store.add_reading(reading("svc", 20, 300.0)).unwrap();

        assert_eq!(first.id, "reading-1");
        assert_eq!(second.id, "reading-2");
        let service = store.service("svc").unwrap().unwrap();
        assert_eq!(service.total_movement, 300.0);
        assert_eq!(service.last_reading_time, 20);

        let readings = store.readings("svc").unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].timestamp, 20);
    }

    #[test]
    fn reading_for_unknown_service_fails() {
        let store = MemoryStore::new();
        assert!(store.add_reading(reading("missing", 0, 1.0)).is_err());
        assert!(store.start_monitoring("missing").is_err());
        assert!(store.service("missing").unwrap().is_none());
    }

    #[test]
    fn monitoring_flags() {
        let store = MemoryStore::new();
        store.put_service(ServiceRecord::new("svc", 1000.0)).unwrap();

        store.start_monitoring("svc").unwrap();
        let service = store.service("svc").unwrap().unwrap();
        assert!(service.is_monitoring);
        assert_eq!(service.status, ServiceStatus::Active);

        // Only one session at a time.
        assert!(store.start_monitoring("svc").is_err());

        store.stop_monitoring("svc").unwrap();
        let service = store.service("svc").unwrap().unwrap();
        assert!(!service.is_monitoring);
        assert_eq!(service.status, ServiceStatus::Completed);

        store.start_monitoring("svc").unwrap();
    }

    #[test]
    fn reset_clears_only_that_service() {
        let store = MemoryStore::new();
        store.put_service(ServiceRecord::new("a", 1000.0)).unwrap();
        store.put_service(ServiceRecord::new("b", 1000.0)).unwrap();
        store.add_reading(reading("a", 1, 50.0)).unwrap();
        store.add_reading(reading("b", 2, 70.0)).unwrap();
        store.stop_monitoring("a").unwrap();

        store.reset_readings("a").unwrap();

        let a = store.service("a").unwrap().unwrap();
        assert_eq!(a.total_movement, 0.0);
        assert_eq!(a.status, ServiceStatus::Active);
        assert!(store.readings("a").unwrap().is_empty());
        assert_eq!(store.readings("b").unwrap().len(), 1);
        assert_eq!(store.service("b").unwrap().unwrap().total_movement, 70.0);
    }

    #[test]
    fn status_summary() {
        let store = MemoryStore::new();
        store.put_service(ServiceRecord::new("svc", 100.0)).unwrap();
        store.add_reading(reading("svc", 5, 40.0)).unwrap();
        store.add_reading(reading("svc", 9, 110.0)).unwrap();

        let summary = store.status_summary("svc").unwrap();
        assert_eq!(summary.total_readings, 2);
        assert_eq!(summary.total_movement, 110.0);
        assert_eq!(summary.last_reading_time, 9);
        assert!(summary.is_mileage_exceeded);
        assert!(!summary.is_monitoring);

        assert!(store.status_summary("missing").is_err());
    }
}
