//! Durable records for vehicle services and their movement readings.
//!
//! The session controller only needs a handful of operations: read a
//! service's running total and mileage limit, flag monitoring on and off,
//! append the final reading of a session, and reset. `ServiceStore` is that
//! surface; `MemoryStore` and `JsonFileStore` implement it.

mod data;
pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mileage limit given to services created without one.
pub const DEFAULT_MILEAGE_LIMIT: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Active,
    Completed,
    Cancelled,
}

/// A vehicle service whose movement is being tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub vehicle_ids: Vec<String>,
    pub status: ServiceStatus,
    pub created_at: u64,
    /// Running total carried across sessions. Seeds the next session.
    pub total_movement: f32,
    /// Total at which the service is due.
    pub mileage_limit: f32,
    pub is_monitoring: bool,
    pub last_reading_time: u64,
}

impl ServiceRecord {
    pub fn new(id: impl Into<String>, mileage_limit: f32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            vehicle_ids: Vec::new(),
            status: ServiceStatus::Active,
            created_at: now_ms(),
            total_movement: 0.0,
            mileage_limit,
            is_monitoring: false,
            last_reading_time: 0,
        }
    }

    /// First vehicle, if any.
    pub fn vehicle_id(&self) -> Option<&str> {
        self.vehicle_ids.first().map(String::as_str)
    }

    pub fn is_mileage_exceeded(&self) -> bool {
        self.mileage_limit > 0.0 && self.total_movement >= self.mileage_limit
    }
}

/// The final reading of one monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReading {
    /// Assigned by the store.
    pub id: String,
    pub service_id: String,
    pub user_id: String,
    pub timestamp: u64,
    /// Absolute running total at the end of the session (seed included).
    pub total_movement: f32,
    pub duration_ms: u64,
    pub is_vehicle_movement: bool,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusSummary {
    pub service_id: String,
    pub total_readings: usize,
    pub total_movement: f32,
    pub mileage_limit: f32,
    pub is_monitoring: bool,
    pub last_reading_time: u64,
    pub is_mileage_exceeded: bool,
}

/// Durable storage for services and readings.
pub trait ServiceStore: Send + Sync {
    /// Look up a service. `Ok(None)` if it does not exist.
    fn service(&self, service_id: &str) -> Result<Option<ServiceRecord>>;

    /// Insert or replace a service.
    fn put_service(&self, service: ServiceRecord) -> Result<()>;

    /// Flag the service as being monitored.
    ///
    /// Fails if the flag is already set: one session per service.
    fn start_monitoring(&self, service_id: &str) -> Result<()>;

    /// Clear the monitoring flag and mark the service completed.
    fn stop_monitoring(&self, service_id: &str) -> Result<()>;

    /// Append a reading and carry its total over to the service.
    fn add_reading(&self, reading: ServiceReading) -> Result<ServiceReading>;

    /// Readings of a service, newest first.
    fn readings(&self, service_id: &str) -> Result<Vec<ServiceReading>>;

    /// Delete all readings, zero the total, and reactivate the service.
    fn reset_readings(&self, service_id: &str) -> Result<()>;

    fn status_summary(&self, service_id: &str) -> Result<ServiceStatusSummary> {
        let service = self
            .service(service_id)?
            .ok_or_else(|| anyhow::anyhow!("Unknown service {service_id}"))?;
        let readings = self.readings(service_id)?;

        Ok(ServiceStatusSummary {
            service_id: service.id.clone(),
            total_readings: readings.len(),
            total_movement: service.total_movement,
            mileage_limit: service.mileage_limit,
            is_monitoring: service.is_monitoring,
            last_reading_time: readings.iter().map(|r| r.timestamp).max().unwrap_or(0),
            is_mileage_exceeded: service.is_mileage_exceeded(),
        })
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
