use async_trait::async_trait;
use fxstream_data::{alert::store::AlertStore, Alert, StoreError};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// JSON-file-backed alert store.
///
/// The whole alert list is rewritten per mutation; write volume here is
/// human-scale (alert create/delete), not tick-scale. A missing file
/// reads as an empty store.
#[derive(Debug)]
pub struct FileAlertStore {
    path: PathBuf,
    // Serialises read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileAlertStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<Alert>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn write_all(&self, alerts: &[Alert]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(alerts)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for FileAlertStore {
    async fn load_armed(&self) -> Result<Vec<Alert>, StoreError> {
        let _guard = self.lock.lock().await;
        let alerts = self.read_all().await?;
        Ok(alerts.into_iter().filter(Alert::is_armed).collect())
    }

    async fn insert(&self, alert: &Alert) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut alerts = self.read_all().await?;
        alerts.retain(|existing| existing.id != alert.id);
        alerts.push(alert.clone());
        self.write_all(&alerts).await
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut alerts = self.read_all().await?;
        alerts.retain(|existing| existing.id != id);
        self.write_all(&alerts).await
    }
}
