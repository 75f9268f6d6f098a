//! pvault: encrypted photo backup CLI
//!
//! Local commands:
//!   encrypt <files...>   - encrypt to `<file>.enc` + `<file>.enc.json` sidecar
//!   decrypt <blob>       - decrypt a blob using its sidecar
//!
//! Storage commands:
//!   push <files...>      - encrypt and upload
//!   pull <id> [<dest>]   - download and decrypt
//!   ls, rename, rm, mv   - manage stored files
//!   folder ls|rename|rm  - manage folders
//!   status               - storage reachability, usage, crypto settings
//!   config show          - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pvault_core::config::{CryptoConfig, PvaultConfig};
use pvault_core::types::format_bytes;
use pvault_crypto::{encrypt_batch, BatchItem, BatchMode, Encryptor, Envelope, KdfParams, Sidecar};
use pvault_storage::{BackupStore, BucketCredentials};
use secrecy::SecretString;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CONFIG_PATH: &str = "~/.config/pvault/config.toml";
const PASSPHRASE_ENV: &str = "PVAULT_PASSPHRASE";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pvault",
    version,
    about = "Encrypted photo backup",
    long_about = "pvault: encrypt photos on this machine and back them up to S3-compatible storage"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "PVAULT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive (overrides logging.level)
    #[arg(long, env = "PVAULT_LOG")]
    log: Option<String>,

    /// Log format (overrides logging.format)
    #[arg(long, env = "PVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        if format == "json" {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt local files into blob + JSON sidecar pairs
    ///
    /// The passphrase is read from PVAULT_PASSPHRASE or prompted for.
    Encrypt {
        /// Files to encrypt
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output file (one input) or directory (several inputs)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Wrap each file key under a passphrase
        #[arg(long)]
        protect: bool,
    },

    /// Decrypt a blob written by `encrypt`
    Decrypt {
        /// Ciphertext blob
        blob: PathBuf,
        /// Sidecar JSON (default: <blob>.json)
        #[arg(long)]
        sidecar: Option<PathBuf>,
        /// Where to write the plaintext
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Encrypt files and upload them
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Push {
        /// Files to back up
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Folder to file the uploads under (default: backup.default_folder)
        #[arg(long, short = 'f')]
        folder: Option<String>,
        /// Wrap each file key under a passphrase
        #[arg(long)]
        protect: bool,
        /// Files in flight at once (default: backup.concurrency)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
    },

    /// Download and decrypt a stored file
    Pull {
        /// Stored file id (see `pvault ls`)
        id: String,
        /// Destination file or directory (default: current directory)
        dest: Option<PathBuf>,
    },

    /// List stored files
    Ls {
        /// Only files in this folder
        #[arg(long, short = 'f')]
        folder: Option<String>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the display name of a stored file
    Rename {
        id: String,
        name: String,
    },

    /// Delete a stored file
    Rm {
        id: String,
    },

    /// Move a stored file into a folder
    Mv {
        id: String,
        /// Target folder; omit to move the file to the top level
        folder: Option<String>,
    },

    /// Folder management
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Show storage reachability, usage, and crypto settings
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum FolderAction {
    /// List folders with their file counts
    Ls,
    /// Rename a folder and everything nested in it
    Rename { old: String, new: String },
    /// Delete a folder and every file in it
    Rm {
        folder: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
    init_logging(level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "pvault starting"
    );

    match cli.command {
        Commands::Encrypt { files, output, protect } => {
            cmd_encrypt(&config, &files, output.as_deref(), protect).await
        }
        Commands::Decrypt { blob, sidecar, output } => {
            cmd_decrypt(&blob, sidecar.as_deref(), &output).await
        }
        Commands::Push { files, folder, protect, jobs } => {
            cmd_push(&config, &files, folder, protect, jobs).await
        }
        Commands::Pull { id, dest } => cmd_pull(&config, &id, dest.as_deref()).await,
        Commands::Ls { folder, json } => cmd_ls(&config, folder.as_deref(), json).await,
        Commands::Rename { id, name } => cmd_rename(&config, &id, &name).await,
        Commands::Rm { id } => cmd_rm(&config, &id).await,
        Commands::Mv { id, folder } => cmd_mv(&config, &id, folder.as_deref()).await,
        Commands::Folder { action } => cmd_folder(&config, action).await,
        Commands::Status => cmd_status(&config, &config_path).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<PvaultConfig> {
    PvaultConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// KDF for new envelopes, from the `[crypto]` section.
fn kdf_from_config(crypto: &CryptoConfig) -> Result<KdfParams> {
    let kdf = match crypto.kdf.as_str() {
        "argon2id" => KdfParams::Argon2id {
            mem_cost_kib: crypto.argon2_mem_cost_kib,
            time_cost: crypto.argon2_time_cost,
            parallelism: crypto.argon2_parallelism,
        },
        _ => KdfParams::Pbkdf2Sha256 {
            iterations: crypto.pbkdf2_iterations,
        },
    };
    kdf.check_strength()
        .with_context(|| format!("crypto settings rejected ({})", describe_kdf(&kdf)))?;
    Ok(kdf)
}

fn describe_kdf(kdf: &KdfParams) -> String {
    match kdf {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            format!("PBKDF2-HMAC-SHA256, {iterations} iterations")
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => format!("Argon2id, m={mem_cost_kib} KiB, t={time_cost}, p={parallelism}"),
    }
}

// ── Passphrase handling ───────────────────────────────────────────────────────

fn passphrase_from_env() -> Option<SecretString> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
}

/// Passphrase for new envelopes; `None` means the file key travels unwrapped.
fn passphrase_for_encrypt(crypto: &CryptoConfig, protect: bool) -> Result<Option<SecretString>> {
    if !protect {
        if crypto.require_passphrase {
            anyhow::bail!(
                "crypto.require_passphrase is set; pass --protect to encrypt under a passphrase"
            );
        }
        warn!("encrypting without a passphrase: each file key is stored next to its ciphertext");
        return Ok(None);
    }

    if let Some(pass) = passphrase_from_env() {
        return Ok(Some(pass));
    }

    let first = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    if first.is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    let second =
        rpassword::prompt_password("Confirm passphrase: ").context("reading passphrase")?;
    if first != second {
        anyhow::bail!("passphrases do not match");
    }
    Ok(Some(SecretString::from(first)))
}

/// Passphrase for an existing envelope; only asked for when it is protected.
fn passphrase_for_decrypt(protected: bool) -> Result<Option<SecretString>> {
    if !protected {
        return Ok(None);
    }
    if let Some(pass) = passphrase_from_env() {
        return Ok(Some(pass));
    }
    let pass = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    Ok(Some(SecretString::from(pass)))
}

// ── Storage from environment credentials ──────────────────────────────────────

/// Open the backup store using credentials from environment variables.
///
/// Reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (standard S3 env vars).
fn open_store(config: &PvaultConfig) -> Result<BackupStore> {
    let creds = BucketCredentials::from_env()?;
    pvault_storage::open_store(&config.storage, &creds).context("opening backup storage")
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `pvault encrypt` ──────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &PvaultConfig,
    files: &[PathBuf],
    output: Option<&Path>,
    protect: bool,
) -> Result<()> {
    let encryptor = Encryptor::new(kdf_from_config(&config.crypto)?);
    let passphrase = passphrase_for_encrypt(&config.crypto, protect)?;

    let single = files.len() == 1;
    if let (false, Some(dir)) = (single, output) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating dir: {}", dir.display()))?;
    }

    let pb = make_progress_bar(files.len() as u64, "encrypt");
    let pb_cb = pb.clone();
    let progress = move |done: u64, _total: u64, name: &str| {
        pb_cb.set_position(done);
        pb_cb.set_message(name.to_string());
    };
    let results = encrypt_to_disk(
        &encryptor,
        files,
        output,
        passphrase.as_ref(),
        Some(&progress as &(dyn Fn(u64, u64, &str) + Send + Sync)),
    )
    .await;
    pb.finish_and_clear();

    let mut failed = 0usize;
    for (file, result) in files.iter().zip(&results) {
        match result {
            Ok(blob_path) => println!("  {} → {}", file.display(), blob_path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("  FAILED  {}: {e:#}", file.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed to encrypt", files.len());
    }
    Ok(())
}

/// Encrypt each file to a blob + sidecar pair. Returns one result per input,
/// in input order; a file that cannot be read, encrypted, or written does
/// not stop the others.
async fn encrypt_to_disk(
    encryptor: &Encryptor,
    files: &[PathBuf],
    output: Option<&Path>,
    passphrase: Option<&SecretString>,
    progress: Option<&(dyn Fn(u64, u64, &str) + Send + Sync)>,
) -> Vec<Result<PathBuf>> {
    let single = files.len() == 1;
    let mut results: Vec<Option<Result<PathBuf>>> = Vec::with_capacity(files.len());
    let mut readable = Vec::new();
    let mut plaintexts = Vec::new();

    for (idx, file) in files.iter().enumerate() {
        match tokio::fs::read(file).await {
            Ok(data) => {
                readable.push(idx);
                plaintexts.push(data);
                results.push(None);
            }
            Err(e) => {
                results.push(Some(
                    Err(e).with_context(|| format!("reading: {}", file.display())),
                ));
            }
        }
    }

    let items: Vec<BatchItem<'_>> = readable
        .iter()
        .zip(&plaintexts)
        .map(|(&idx, data)| BatchItem {
            name: files[idx].display().to_string(),
            plaintext: data,
            passphrase,
        })
        .collect();

    let outcomes = tokio::task::block_in_place(|| {
        encrypt_batch(encryptor, &items, BatchMode::Parallel, progress)
    });

    for (&idx, outcome) in readable.iter().zip(outcomes) {
        let file = &files[idx];
        let written = match outcome.result {
            Ok(envelope) => {
                let blob_path = encrypted_output_path(file, output, single);
                write_envelope(&blob_path, &envelope)
                    .await
                    .map(|()| blob_path)
            }
            Err(e) => Err(e).with_context(|| format!("encrypting: {}", file.display())),
        };
        results[idx] = Some(written);
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(anyhow::anyhow!("file was not processed"))))
        .collect()
}

/// `-o` names the file for a single input and the directory for several.
fn encrypted_output_path(input: &Path, output: Option<&Path>, single: bool) -> PathBuf {
    if let (true, Some(out)) = (single, output) {
        return out.to_path_buf();
    }
    let mut name = input.file_name().map(OsString::from).unwrap_or_default();
    name.push(".enc");
    match output {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// `<blob>.json`
fn sidecar_path(blob: &Path) -> PathBuf {
    let mut s = blob.as_os_str().to_owned();
    s.push(".json");
    PathBuf::from(s)
}

async fn write_envelope(blob_path: &Path, envelope: &Envelope) -> Result<()> {
    let sidecar = envelope
        .sidecar()
        .to_bytes()
        .context("serializing sidecar")?;
    tokio::fs::write(blob_path, envelope.ciphertext())
        .await
        .with_context(|| format!("writing: {}", blob_path.display()))?;
    let side = sidecar_path(blob_path);
    tokio::fs::write(&side, sidecar)
        .await
        .with_context(|| format!("writing: {}", side.display()))?;
    Ok(())
}

// ── `pvault decrypt` ──────────────────────────────────────────────────────────

async fn cmd_decrypt(blob: &Path, sidecar: Option<&Path>, output: &Path) -> Result<()> {
    let side = sidecar
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sidecar_path(blob));

    let ciphertext = tokio::fs::read(blob)
        .await
        .with_context(|| format!("reading: {}", blob.display()))?;
    let sidecar_bytes = tokio::fs::read(&side)
        .await
        .with_context(|| format!("reading sidecar: {}", side.display()))?;
    let sidecar = Sidecar::from_bytes(&sidecar_bytes)
        .with_context(|| format!("parsing sidecar: {}", side.display()))?;
    let envelope = Envelope::from_parts(ciphertext, &sidecar)
        .with_context(|| format!("invalid sidecar: {}", side.display()))?;

    let passphrase = passphrase_for_decrypt(envelope.is_key_protected())?;

    let spinner = make_spinner("decrypt");
    spinner.set_message(blob.display().to_string());
    let plaintext = tokio::task::spawn_blocking(move || {
        pvault_crypto::decrypt_file(&envelope, passphrase.as_ref())
    })
    .await
    .context("decryption task")?
    .with_context(|| format!("decrypting: {}", blob.display()))?;
    spinner.finish_and_clear();

    tokio::fs::write(output, &plaintext)
        .await
        .with_context(|| format!("writing: {}", output.display()))?;

    println!("Decrypted {} → {}", blob.display(), output.display());
    println!("  bytes:  {}", format_bytes(plaintext.len() as u64));
    Ok(())
}

// ── `pvault push` ─────────────────────────────────────────────────────────────

async fn cmd_push(
    config: &PvaultConfig,
    files: &[PathBuf],
    folder: Option<String>,
    protect: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let store = open_store(config)?;
    let encryptor = Encryptor::new(kdf_from_config(&config.crypto)?);
    let passphrase = passphrase_for_encrypt(&config.crypto, protect)?;
    let folder = folder.or_else(|| config.backup.default_folder.clone());
    let jobs = jobs.unwrap_or(config.backup.concurrency);

    println!(
        "Pushing {} file(s) → {}:{} (endpoint: {})",
        files.len(),
        config.storage.bucket,
        config.storage.prefix,
        config.storage.endpoint,
    );

    let pb = make_progress_bar(files.len() as u64, "push");
    let pb_clone = pb.clone();
    let progress: pvault_backup::ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });

    let outcomes = pvault_backup::backup_batch(
        &store,
        &encryptor,
        files,
        passphrase.as_ref(),
        folder.as_deref(),
        jobs,
        Some(&progress),
    )
    .await;
    pb.finish_with_message("done".to_string());

    let mut uploaded = 0usize;
    let mut bytes = 0u64;
    println!();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(r) => {
                uploaded += 1;
                bytes += r.bytes;
                println!("  {}  {}", r.id, outcome.path.display());
            }
            Err(e) => eprintln!("  FAILED  {}: {e:#}", outcome.path.display()),
        }
    }

    println!();
    println!("Push complete:");
    println!("  uploaded: {} files ({})", uploaded, format_bytes(bytes));
    println!("  failed:   {} files", outcomes.len() - uploaded);
    println!(
        "  keys:     {}",
        if passphrase.is_some() {
            "passphrase-protected"
        } else {
            "UNPROTECTED (stored with each file)"
        }
    );

    if uploaded < outcomes.len() {
        anyhow::bail!("{} of {} files failed", outcomes.len() - uploaded, outcomes.len());
    }
    Ok(())
}

// ── `pvault pull` ─────────────────────────────────────────────────────────────

async fn cmd_pull(config: &PvaultConfig, id: &str, dest: Option<&Path>) -> Result<()> {
    let store = open_store(config)?;
    let record = store
        .get(id)
        .await
        .with_context(|| format!("looking up {id}"))?;
    let passphrase = passphrase_for_decrypt(record.encryption.is_key_protected)?;
    let dest = dest.unwrap_or_else(|| Path::new("."));

    let spinner = make_spinner("pull");
    spinner.set_message(record.original_filename.clone());

    let result = pvault_backup::restore_file(
        &store,
        &Encryptor::default(),
        &record.id,
        dest,
        passphrase.as_ref(),
    )
    .await?;

    spinner.finish_and_clear();
    println!("Downloaded:");
    println!("  local:  {}", result.local_path.display());
    println!("  bytes:  {}", format_bytes(result.bytes));
    Ok(())
}

// ── `pvault ls` ───────────────────────────────────────────────────────────────

async fn cmd_ls(config: &PvaultConfig, folder: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let files = store.list(folder).await.context("listing stored files")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&files).context("serializing file list")?
        );
        return Ok(());
    }

    if files.is_empty() {
        println!("No stored files.");
        return Ok(());
    }

    let now = now_unix();
    for f in &files {
        let name = match &f.folder {
            Some(folder) => format!("{folder}/{}", f.original_filename),
            None => f.original_filename.clone(),
        };
        println!(
            "{}  {:>9}  {:>8}  {}  {}",
            f.id,
            format_bytes(f.size),
            format_age(now.saturating_sub(f.created_at)),
            if f.encryption.is_key_protected { "locked" } else { "open  " },
            name,
        );
    }
    println!();
    println!("{} file(s)", files.len());
    Ok(())
}

// ── `pvault rename` / `pvault rm` ─────────────────────────────────────────────

async fn cmd_rename(config: &PvaultConfig, id: &str, name: &str) -> Result<()> {
    let store = open_store(config)?;
    let record = store
        .rename(id, name)
        .await
        .with_context(|| format!("renaming {id}"))?;
    println!("Renamed {} → {}", record.id, record.original_filename);
    Ok(())
}

async fn cmd_rm(config: &PvaultConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    store
        .delete(id)
        .await
        .with_context(|| format!("deleting {id}"))?;
    println!("Deleted {id}");
    Ok(())
}

async fn cmd_mv(config: &PvaultConfig, id: &str, folder: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let record = store
        .move_file(id, folder)
        .await
        .with_context(|| format!("moving {id}"))?;
    println!(
        "Moved {} → {}",
        record.original_filename,
        record.folder.as_deref().unwrap_or("/")
    );
    Ok(())
}

// ── `pvault folder` ───────────────────────────────────────────────────────────

async fn cmd_folder(config: &PvaultConfig, action: FolderAction) -> Result<()> {
    let store = open_store(config)?;
    match action {
        FolderAction::Ls => {
            let folders = store.folders().await.context("listing folders")?;
            if folders.is_empty() {
                println!("No folders.");
                return Ok(());
            }
            for f in &folders {
                println!("{:>6} file(s)  {:>9}  {}", f.file_count, format_bytes(f.bytes), f.name);
            }
        }
        FolderAction::Rename { old, new } => {
            let moved = store
                .rename_folder(&old, &new)
                .await
                .with_context(|| format!("renaming folder {old}"))?;
            println!("Renamed folder {old} → {new} ({moved} file(s))");
        }
        FolderAction::Rm { folder, yes } => {
            if !yes && !confirm(&format!("Delete folder {folder} and every file in it? [y/N] "))? {
                println!("Aborted.");
                return Ok(());
            }
            let removed = store
                .delete_folder(&folder)
                .await
                .with_context(|| format!("deleting folder {folder}"))?;
            println!("Deleted folder {folder} ({removed} file(s))");
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush().context("writing prompt")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// ── `pvault status` ───────────────────────────────────────────────────────────

async fn cmd_status(config: &PvaultConfig, config_path: &Path) -> Result<()> {
    println!("pvault v{}", env!("CARGO_PKG_VERSION"));
    println!("  config:      {}", config_path.display());
    println!("  endpoint:    {}", config.storage.endpoint);
    println!(
        "  bucket:      {}/{}",
        config.storage.bucket, config.storage.prefix
    );

    match kdf_from_config(&config.crypto) {
        Ok(kdf) => println!("  kdf:         {}", describe_kdf(&kdf)),
        Err(e) => println!("  kdf:         INVALID ({e:#})"),
    }
    println!(
        "  passphrase:  {}",
        if config.crypto.require_passphrase {
            "required"
        } else {
            "optional"
        }
    );

    let store = open_store(config)?;
    match pvault_storage::check_health(store.operator()).await {
        Ok(latency) => println!("  storage:     ok ({} ms)", latency.as_millis()),
        Err(e) => {
            println!("  storage:     UNREACHABLE");
            return Err(e);
        }
    }

    let usage = store.usage().await.context("computing usage")?;
    println!(
        "  usage:       {} file(s), {} ({} stored)",
        usage.files,
        format_bytes(usage.bytes),
        format_bytes(usage.encrypted_bytes)
    );
    Ok(())
}

// ── `pvault config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &PvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
