/// Errors returned by tools and tool adapters.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool name was not found in registry.
    #[error("tool not registered: {0}")]
    ToolNotFound(String),
    /// Tool received invalid arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// Upstream service rejected the credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Upstream service did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ToolError {
    /// Short machine-readable label for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ToolNotFound(_) => "not_found",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::ExecutionFailed(_) => "execution_failed",
            ToolError::Unauthorized(_) => "unauthorized",
            ToolError::Timeout(_) => "timeout",
        }
    }
}
