//! Publish sink contract and delivery policy
//!
//! The sink owns the broker connection. `Delivery` wraps it with the
//! reconnect rule: a failed publish triggers a reconnect and a retry of the
//! same record; two consecutive failed reconnects end the process.

use crate::error::EngineError;
use crate::normalize::Record;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Consecutive failed reconnects tolerated before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("broker disconnected: {0}")]
    Disconnected(String),
    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Accepts normalized records; must be safe to call from concurrent tasks
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, target_id: &str, record: &Record) -> Result<(), SinkError>;

    /// Re-establish the broker connection; `Ok` when already connected
    async fn reconnect(&self) -> Result<(), SinkError>;
}

pub struct Delivery {
    sink: Arc<dyn PublishSink>,
    // one reconnect sequence at a time; other publishers wait for its result
    reconnecting: Mutex<()>,
    max_reconnects: u32,
    // set once the broker is given up, later records fail without retrying
    lost: AtomicBool,
}

impl Delivery {
    pub fn new(sink: Arc<dyn PublishSink>) -> Self {
        Self {
            sink,
            reconnecting: Mutex::new(()),
            max_reconnects: MAX_RECONNECT_ATTEMPTS,
            lost: AtomicBool::new(false),
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn already_lost(&self) -> EngineError {
        EngineError::SinkLost {
            attempts: self.max_reconnects,
            source: SinkError::Disconnected("broker given up earlier".into()),
        }
    }

    pub async fn deliver(&self, target_id: &str, record: &Record) -> Result<(), EngineError> {
        if self.is_lost() {
            return Err(self.already_lost());
        }

        let first_error = match self.sink.publish(target_id, record).await {
            Ok(()) => return Ok(()),
            Err(SinkError::Encode(e)) => {
                error!(%target_id, error = %e, "dropping record that cannot be encoded");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(%target_id, error = %first_error, "publish failed, reconnecting to broker");

        let _guard = self.reconnecting.lock().await;
        if self.is_lost() {
            return Err(self.already_lost());
        }
        let mut failures = 0;
        loop {
            let result = match self.sink.reconnect().await {
                Ok(()) => self.sink.publish(target_id, record).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(%target_id, "publish resumed after reconnect");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    warn!(%target_id, attempt = failures, max = self.max_reconnects, error = %e, "reconnect attempt failed");
                    if failures >= self.max_reconnects {
                        error!(%target_id, "broker unreachable, giving up");
                        self.lost.store(true, Ordering::SeqCst);
                        return Err(EngineError::SinkLost {
                            attempts: failures,
                            source: e,
                        });
                    }
                }
            }
        }
    }
}
