//! Transaction log behavior

use serde::{Deserialize, Serialize};

/// Options for opening, writing and upgrading transaction logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    sync_on_write: bool,
    rewrite_on_upgrade: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sync_on_write: false,
            rewrite_on_upgrade: true,
        }
    }
}

impl LogConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Whether every written record is followed by `fsync`.
    #[must_use]
    pub const fn sync_on_write(&self) -> bool {
        self.sync_on_write
    }

    /// Whether a log read under an older schema is rewritten in place.
    #[must_use]
    pub const fn rewrite_on_upgrade(&self) -> bool {
        self.rewrite_on_upgrade
    }
}

/// Builder for [`LogConfig`]
#[derive(Debug, Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    /// Call `File::sync_all` after every record (default: off)
    #[must_use]
    pub const fn sync_on_write(mut self, enabled: bool) -> Self {
        self.config.sync_on_write = enabled;
        self
    }

    /// Persist migrated records back to the log (default: on)
    #[must_use]
    pub const fn rewrite_on_upgrade(mut self, enabled: bool) -> Self {
        self.config.rewrite_on_upgrade = enabled;
        self
    }

    /// Build the config
    #[must_use]
    pub const fn build(self) -> LogConfig {
        self.config
    }
}
