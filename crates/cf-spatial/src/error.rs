//! Error types for spatial index operations.

/// Errors that can occur during spatial index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SpatialError {
    /// The key is already stored in the tree.
    #[error("key {0} is already in the tree")]
    DuplicateKey(String),

    /// The key is not stored in the tree.
    #[error("key {0} is not in the tree")]
    UnknownKey(String),

    /// The node hierarchy is inconsistent.
    #[error("corrupt tree: {reason}")]
    CorruptTree {
        /// What check failed.
        reason: String,
    },

    /// A leaf's cached pair list is inconsistent.
    #[error("corrupt pair thread: {reason}")]
    CorruptPairThread {
        /// What check failed.
        reason: String,
    },

    /// A tree configuration value is out of range.
    #[error("invalid tree configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl SpatialError {
    /// Create a duplicate key error from any debuggable key.
    #[must_use]
    pub fn duplicate_key(key: &impl std::fmt::Debug) -> Self {
        Self::DuplicateKey(format!("{key:?}"))
    }

    /// Create an unknown key error from any debuggable key.
    #[must_use]
    pub fn unknown_key(key: &impl std::fmt::Debug) -> Self {
        Self::UnknownKey(format!("{key:?}"))
    }

    /// Create a corrupt tree error.
    #[must_use]
    pub fn corrupt_tree(reason: impl Into<String>) -> Self {
        Self::CorruptTree {
            reason: reason.into(),
        }
    }

    /// Create a corrupt pair thread error.
    #[must_use]
    pub fn corrupt_pairs(reason: impl Into<String>) -> Self {
        Self::CorruptPairThread {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
