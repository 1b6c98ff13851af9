//! Error kinds, grouped per §7 of the design document: configuration,
//! queue, dispatch, box-protocol and driver errors each surface
//! differently (fatal, soft-drop, static reply, connection reset, ack).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key `{0}` in group `{1}`")]
    MissingKey(String, String),
    #[error("invalid value for `{0}`: {1}")]
    InvalidValue(String, String),
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue overflow: length {len} exceeds soft bound {bound}")]
    Overflow { len: usize, bound: usize },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no matching translation for keyword")]
    RouteNotFound,
    #[error("pattern expansion failed: {0}")]
    PatternExpansion(String),
    #[error("http fetch failed: {0}")]
    HttpFetch(String),
}

#[derive(Debug, Error)]
pub enum BoxProtocolError {
    #[error("unknown message variant tag {0}")]
    UnknownVariant(u8),
    #[error("frame too short")]
    Truncated,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver rejected message: {0}")]
    SubmitFailed(String),
    #[error("driver temporarily unavailable: {0}")]
    SubmitFailedTemporary(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    BoxProtocol(#[from] BoxProtocolError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("operation not allowed in current state")]
    NotAllowed,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
