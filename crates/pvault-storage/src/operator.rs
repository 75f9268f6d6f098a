//! Opening the backup bucket: credential lookup, endpoint policy, and the
//! OpenDAL S3 operator behind a `BackupStore`.

use anyhow::{bail, Context, Result};
use opendal::Operator;
use pvault_core::config::StorageConfig;
use secrecy::{ExposeSecret, SecretString};

use crate::store::BackupStore;

/// Environment variables checked for the access key id, in order.
pub const ACCESS_KEY_VARS: [&str; 2] = ["AWS_ACCESS_KEY_ID", "PVAULT_ACCESS_KEY_ID"];
/// Environment variables checked for the secret key, in order.
pub const SECRET_KEY_VARS: [&str; 2] = ["AWS_SECRET_ACCESS_KEY", "PVAULT_SECRET_ACCESS_KEY"];

/// Bucket credentials. The secret half never appears in `Debug` output.
#[derive(Debug)]
pub struct BucketCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl BucketCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
        }
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`, preferring the AWS names over
    /// the pvault ones. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let find = |names: &[&str]| {
            names
                .iter()
                .copied()
                .find_map(|n| lookup(n).filter(|v| !v.trim().is_empty()))
        };

        let Some(access_key_id) = find(&ACCESS_KEY_VARS[..]) else {
            bail!(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
                 Example:\n\
                 \texport AWS_ACCESS_KEY_ID=your-key\n\
                 \texport AWS_SECRET_ACCESS_KEY=your-secret"
            );
        };
        let Some(secret) = find(&SECRET_KEY_VARS[..]) else {
            bail!("AWS_SECRET_ACCESS_KEY environment variable not set");
        };
        Ok(Self::new(access_key_id, secret))
    }
}

/// Apply the `enforce_tls` policy to the configured endpoint.
///
/// Envelopes stay encrypted over plaintext HTTP, but credentials and file
/// records do not, so it is refused under `enforce_tls` and warned about
/// otherwise.
pub fn check_endpoint(storage: &StorageConfig) -> Result<()> {
    let endpoint = storage.endpoint.trim();
    if endpoint.is_empty() {
        bail!("storage.endpoint is empty");
    }
    let plaintext = endpoint
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"));
    if !plaintext {
        return Ok(());
    }
    if storage.enforce_tls {
        bail!(
            "storage endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
             Use an HTTPS endpoint or set storage.enforce_tls = false for local testing."
        );
    }
    tracing::warn!(
        endpoint,
        "storage endpoint uses plaintext HTTP; credentials and file names travel unencrypted"
    );
    Ok(())
}

/// Build the S3 operator for `storage` with retries and request logging.
pub fn build_operator(storage: &StorageConfig, creds: &BucketCredentials) -> Result<Operator> {
    check_endpoint(storage)?;

    let builder = opendal::services::S3::default()
        .endpoint(storage.endpoint.trim())
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(creds.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .with_context(|| format!("opening bucket {}", storage.bucket))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    tracing::debug!(
        endpoint = %storage.endpoint,
        bucket = %storage.bucket,
        prefix = %storage.prefix,
        "backup bucket ready"
    );
    Ok(op)
}

/// Open the configured bucket as a `BackupStore` rooted at `storage.prefix`.
pub fn open_store(storage: &StorageConfig, creds: &BucketCredentials) -> Result<BackupStore> {
    let op = build_operator(storage, creds)?;
    Ok(BackupStore::new(op, &storage.prefix))
}
