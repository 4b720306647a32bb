//! Build errors

/// Why a crate's DefMap could not be produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The build was cancelled through its `CancellationToken`
    #[error("DefMap build cancelled")]
    Cancelled,

    #[error("Failed to build DefMap for crate '{krate}': {reason}")]
    Failed { krate: String, reason: String },
}

impl BuildError {
    pub fn failed(krate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            krate: krate.into(),
            reason: reason.into(),
        }
    }
}
