use thiserror::Error;

/// Error taxonomy for ToolHive operations.
///
/// Every variant is caught at the dispatch boundary and converted into a
/// failed `OperationResult`; none of them reach the MCP transport as a
/// protocol fault.
#[derive(Error, Debug)]
pub enum ThvError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ThvError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ThvError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ThvError::NotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ThvError::Transport(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        ThvError::Process(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ThvError::Timeout(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ThvError::Parse(msg.into())
    }

    /// Missing required argument for an operation, named after the field.
    pub fn missing_argument(field: &str) -> Self {
        ThvError::Validation(format!("missing required argument: {field}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ThvError::NotFound(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ThvError::Transport(_) | ThvError::Timeout(_))
    }
}
