use serde::{Deserialize, Serialize};
use crate::core::{ArchiveError, Result, validate_identifier};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_ARCHIVE_SUFFIX: &str = "_archive";
pub const DEFAULT_EXPIRATION_COLUMN: &str = "created_at";
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Archive run configuration
///
/// The batch size is the only backpressure control: it bounds how many keys
/// are held in memory and how many rows a single move transaction touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Maximum number of primary keys per batch
    pub batch_size: usize,

    /// Appended to a live table name to get its archive table
    pub archive_suffix: String,

    /// Expiration column for entities that do not override it
    pub default_expiration_column: String,

    /// Primary key column for entities that do not override it
    pub default_primary_key: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            default_expiration_column: DEFAULT_EXPIRATION_COLUMN.to_string(),
            default_primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }
}

impl ArchiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the archive table suffix
    pub fn archive_suffix(mut self, suffix: &str) -> Self {
        self.archive_suffix = suffix.to_string();
        self
    }

    /// Set the default expiration column
    pub fn default_expiration_column(mut self, column: &str) -> Self {
        self.default_expiration_column = column.to_string();
        self
    }

    /// Set the default primary key column
    pub fn default_primary_key(mut self, column: &str) -> Self {
        self.default_primary_key = column.to_string();
        self
    }

    /// Build from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    /// - `CASCADE_ARCHIVE_BATCH_SIZE`
    /// - `CASCADE_ARCHIVE_SUFFIX`
    /// - `CASCADE_ARCHIVE_EXPIRATION_COLUMN`
    /// - `CASCADE_ARCHIVE_PRIMARY_KEY`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CASCADE_ARCHIVE_BATCH_SIZE") {
            config.batch_size = raw.parse().map_err(|_| {
                ArchiveError::InvalidConfig(format!("CASCADE_ARCHIVE_BATCH_SIZE is not a number: {}", raw))
            })?;
        }
        if let Ok(suffix) = std::env::var("CASCADE_ARCHIVE_SUFFIX") {
            config.archive_suffix = suffix;
        }
        if let Ok(column) = std::env::var("CASCADE_ARCHIVE_EXPIRATION_COLUMN") {
            config.default_expiration_column = column;
        }
        if let Ok(column) = std::env::var("CASCADE_ARCHIVE_PRIMARY_KEY") {
            config.default_primary_key = column;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ArchiveError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.archive_suffix.is_empty() {
            return Err(ArchiveError::InvalidConfig("archive_suffix must not be empty".into()));
        }
        // The suffix is glued onto identifiers, so it has to keep them valid
        validate_identifier(&format!("t{}", self.archive_suffix))?;
        validate_identifier(&self.default_expiration_column)?;
        validate_identifier(&self.default_primary_key)?;
        Ok(())
    }

    /// Name of the archive counterpart of `table`.
    pub fn archive_table(&self, table: &str) -> String {
        format!("{}{}", table, self.archive_suffix)
    }
}
