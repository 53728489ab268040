use super::Alert;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Durable persistence boundary for alerts.
///
/// The engine loads non-triggered alerts through this at startup and
/// issues create/delete requests as alerts are made or fire. The store is
/// never consulted for live evaluation - failures here degrade durability,
/// not behaviour.
#[async_trait]
pub trait AlertStore: Send + Sync + 'static {
    async fn load_armed(&self) -> Result<Vec<Alert>, StoreError>;
    async fn insert(&self, alert: &Alert) -> Result<(), StoreError>;
    async fn delete(&self, id: u64) -> Result<(), StoreError>;
}

/// In-memory store used in tests and when no durable backend is
/// configured.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn load_armed(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.alerts.lock().iter().filter(|a| a.is_armed()).cloned().collect())
    }

    async fn insert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.alerts.lock().retain(|a| a.id != id);
        Ok(())
    }
}

/// Maximum delivery attempts per store write before it is dropped.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Delay between retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
enum StoreOp {
    Insert(Alert),
    Delete(u64),
}

/// Fire-and-forget writer in front of an [`AlertStore`].
///
/// Writes are queued and retried a bounded number of times on a dedicated
/// task so the ingest path never blocks on persistence I/O.
#[derive(Debug, Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl StoreWriter {
    /// Spawn the writer task over the given store.
    pub fn spawn(store: Arc<dyn AlertStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreOp>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let result = match &op {
                        StoreOp::Insert(alert) => store.insert(alert).await,
                        StoreOp::Delete(id) => store.delete(*id).await,
                    };
                    match result {
                        Ok(()) => break,
                        Err(error) if attempt < MAX_WRITE_ATTEMPTS => {
                            debug!(%error, attempt, "alert store write failed, retrying");
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                        Err(error) => {
                            warn!(
                                %error,
                                attempts = attempt,
                                "alert store write dropped after retries; in-memory state remains authoritative"
                            );
                            break;
                        }
                    }
                }
            }
        });
        Self { tx }
    }

    pub fn persist(&self, alert: &Alert) {
        let _ = self.tx.send(StoreOp::Insert(alert.clone()));
    }

    pub fn remove(&self, id: u64) {
        let _ = self.tx.send(StoreOp::Delete(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertCondition, AlertSpec, AlertState};
    use chrono::Utc;

    fn alert(id: u64, state: AlertState) -> Alert {
        let mut alert = Alert::new(
            id,
            AlertSpec {
                guild_id: 1,
                user_id: 2,
                channel_id: 3,
                symbol: "eurusd".into(),
                condition: AlertCondition::Above,
                target_price: 1.1,
            },
            Utc::now(),
        );
        alert.state = state;
        alert
    }

    #[tokio::test]
    async fn test_in_memory_store_load_filters_triggered() {
        let store = InMemoryAlertStore::new();
        store.insert(&alert(1, AlertState::Armed)).await.unwrap();
        store.insert(&alert(2, AlertState::Triggered)).await.unwrap();

        let loaded = store.load_armed().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 1);
    }

    #[tokio::test]
    async fn test_store_writer_applies_ops() {
        let store = Arc::new(InMemoryAlertStore::new());
        let writer = StoreWriter::spawn(store.clone());

        writer.persist(&alert(5, AlertState::Armed));
        writer.remove(5);

        // Writer runs on its own task; give it a moment to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.contents().is_empty());
    }
}
