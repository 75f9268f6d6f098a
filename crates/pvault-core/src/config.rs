use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PvaultError, PvaultResult};

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PvaultConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level / EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint holding the backup bucket
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix under which blobs and file records are stored
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

/// Envelope encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Passphrase KDF: "pbkdf2-sha256" or "argon2id"
    pub kdf: String,
    /// PBKDF2 iterations (default: 100000, also the minimum)
    pub pbkdf2_iterations: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Refuse to create envelopes without a passphrase. Unprotected envelopes
    /// carry their own key, so the storage side can read them.
    pub require_passphrase: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Files encrypted/uploaded at once (0 = cpu_count)
    pub concurrency: usize,
    /// Folder assigned to uploads when none is given on the command line
    pub default_folder: Option<String>,
}

impl PvaultConfig {
    /// Parse a TOML document, applying defaults for missing keys.
    pub fn from_toml_str(s: &str) -> PvaultResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| PvaultError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or return defaults if the file does not exist.
    pub fn load(path: &Path) -> PvaultResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| PvaultError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> PvaultResult<()> {
        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(PvaultError::Config(format!(
                    "logging.format must be \"json\" or \"text\", got {other:?}"
                )))
            }
        }
        match self.crypto.kdf.as_str() {
            "pbkdf2-sha256" | "argon2id" => {}
            other => {
                return Err(PvaultError::Config(format!(
                    "crypto.kdf must be \"pbkdf2-sha256\" or \"argon2id\", got {other:?}"
                )))
            }
        }
        if self.storage.bucket.is_empty() {
            return Err(PvaultError::Config("storage.bucket must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "pvault".into(),
            prefix: "backup".into(),
            enforce_tls: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf: "pbkdf2-sha256".into(),
            pbkdf2_iterations: 100_000,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            require_passphrase: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            default_folder: None,
        }
    }
}
