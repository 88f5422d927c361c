use crate::{now_ms, ServiceReading, ServiceRecord, ServiceStatus};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contents shared by the store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreData {
    services: BTreeMap<String, ServiceRecord>,
    readings: Vec<ServiceReading>,
    next_reading_id: u64,
}

impl StoreData {
    pub fn service(&self, service_id: &str) -> Option<ServiceRecord> {
        self.services.get(service_id).cloned()
    }

    pub fn put_service(&mut self, service: ServiceRecord) {
        self.services.insert(service.id.clone(), service);
    }

    pub fn start_monitoring(&mut self, service_id: &str) -> Result<()> {
        let service = self.service_mut(service_id)?;
        if service.is_monitoring {
            bail!("Service {service_id} is already being monitored");
        }
        service.is_monitoring = true;
        service.status = ServiceStatus::Active;
        service.last_reading_time = now_ms();
        Ok(())
    }

    pub fn stop_monitoring(&mut self, service_id: &str) -> Result<()> {
        let service = self.service_mut(service_id)?;
        service.is_monitoring = false;
        service.status = ServiceStatus::Completed;
        Ok(())
    }

    pub fn add_reading(&mut self, mut reading: ServiceReading) -> Result<ServiceReading> {
        let id = format!("reading-{}", self.next_reading_id + 1);
        let service = self.service_mut(&reading.service_id)?;

        // Readings carry the absolute total, so the service takes it as-is.
        service.total_movement = reading.total_movement;
        service.last_reading_time = reading.timestamp;

        self.next_reading_id += 1;
        reading.id = id;
        self.readings.push(reading.clone());
        Ok(reading)
    }

    pub fn readings(&self, service_id: &str) -> Vec<ServiceReading> {
        let mut readings: Vec<ServiceReading> = self
            .readings
            .iter()
            .filter(|r| r.service_id == service_id)
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings
    }

    pub fn reset_readings(&mut self, service_id: &str) -> Result<()> {
        let service = self.service_mut(service_id)?;
        service.total_movement = 0.0;
        service.status = ServiceStatus::Active;
        service.is_monitoring = false;
        self.readings.retain(|r| r.service_id != service_id);
        Ok(())
    }

    fn service_mut(&mut self, service_id: &str) -> Result<&mut ServiceRecord> {
        self.services
            .get_mut(service_id)
            .ok_or_else(|| anyhow!("Unknown service {service_id}"))
    }
}
