use crate::data::StoreData;
use crate::{ServiceReading, ServiceRecord, ServiceStore};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Store backed by a single JSON file, rewritten after every change.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let data: StoreData = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!(?path, "Opened store");
            data
        } else {
            info!(?path, "No store found, starting empty");
            StoreData::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> Result<MutexGuard<'_, StoreData>> {
        self.data.lock().map_err(|_| anyhow!("Store lock poisoned"))
    }

    /// Apply a change and write the result to disk.
    ///
    /// The change is made on a copy that replaces the in-memory data only
    /// once it is on disk, so a failed write leaves both untouched.
    fn update<T>(&self, change: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let mut data = self.data()?;
        let mut next = data.clone();
        let value = change(&mut next)?;
        self.persist(&next)?;
        *data = next;
        Ok(value)
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = ?self.path, "Store saved");
        Ok(())
    }
}

impl ServiceStore for JsonFileStore {
    fn service(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        Ok(self.data()?.service(service_id))
    }

    fn put_service(&self, service: ServiceRecord) -> Result<()> {
        self.update(|data| {
            data.put_service(service);
            Ok(())
        })
    }

    fn start_monitoring(&self, service_id: &str) -> Result<()> {
        self.update(|data| data.start_monitoring(service_id))
    }

    fn stop_monitoring(&self, service_id: &str) -> Result<()> {
        self.update(|data| data.stop_monitoring(service_id))
    }

    fn add_reading(&self, reading: ServiceReading) -> Result<ServiceReading> {
        self.update(|data| data.add_reading(reading))
    }

    fn readings(&self, service_id: &str) -> Result<Vec<ServiceReading>> {
        Ok(self.data()?.readings(service_id))
    }

    fn reset_readings(&self, service_id: &str) -> Result<()> {
        self.update(|data| data.reset_readings(service_id))
    }
}
