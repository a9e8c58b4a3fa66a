use thiserror::Error;

/// Everything that can go wrong between the polling loop and the radio.
#[derive(Debug, Error)]
pub enum Error {
    /// The peripheral was not found during scanning, or every connect attempt failed.
    #[error("device {address} unreachable after {attempts} attempts")]
    DeviceUnreachable { address: String, attempts: u32 },

    /// A frame transfer was malformed or incomplete.
    #[error("framing error: {0}")]
    Framing(String),

    /// The peripheral answered, but not with what was asked for.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error reported by the peripheral itself.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("timed out during {operation}")]
    Timeout { operation: &'static str },

    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the polling loop should back off and retry after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::Config(_))
    }

    /// A short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DeviceUnreachable { .. } => "device_unreachable",
            Error::Framing(_) => "framing",
            Error::Protocol(_) => "protocol",
            Error::Rpc { .. } => "rpc",
            Error::Timeout { .. } => "timeout",
            Error::Bluetooth(_) => "bluetooth",
            Error::Transport(_) => "transport",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(!Error::Config("bad".into()).is_transient());
        assert!(Error::Framing("short".into()).is_transient());
        assert!(Error::Rpc { code: -103, message: "bad method".into() }.is_transient());
        assert!(Error::DeviceUnreachable { address: "A0:DD:6C:4B:9C:36".into(), attempts: 3 }.is_transient());
    }

    #[test]
    fn test_rpc_error_display() {
        let err = Error::Rpc { code: 404, message: "No handler".into() };
        assert_eq!(err.to_string(), "rpc error 404: No handler");
        assert_eq!(err.kind(), "rpc");
    }
}
