use crate::sink::SinkError;

/// Errors that stop the polling loop
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The broker stayed unreachable after the allowed reconnect attempts
    #[error("publish sink lost after {attempts} failed reconnect attempts: {source}")]
    SinkLost {
        attempts: u32,
        #[source]
        source: SinkError,
    },
}
