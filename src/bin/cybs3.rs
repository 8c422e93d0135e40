//! cybs3 — encrypted S3 command line client.
//!
//! Thin composition over the library: every subcommand resolves what it
//! needs (mnemonic, config, client), calls core operations, and prints.
//! All terminal I/O lives here; the library never writes to the console.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use std::io::Write as _;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use cybs3::codec::{ciphertext_length_for, decrypt_stream, encrypt_stream, plaintext_length_for};
use cybs3::config::{Config, ConfigStore, Vault};
use cybs3::crypto::SymmetricKey;
use cybs3::keychain::{OsKeychain, SecretStore};
use cybs3::mnemonic::Mnemonic;
use cybs3::retry::{with_retry, RetryPolicy};
use cybs3::session::{self, Session, SessionOptions};

#[derive(Parser)]
#[command(
    name = "cybs3",
    about = "Encrypted S3 client — objects are encrypted before they leave this machine",
    version,
    long_about = "All object bodies are encrypted locally with a persistent Data Key; \
                  credentials live in a config file sealed under a key derived from \
                  your 12-word mnemonic. The storage service only ever sees ciphertext."
)]
struct Cli {
    /// Use a named vault from the config
    #[arg(long, global = true)]
    vault: Option<String>,

    /// Override the S3 endpoint (host or URL)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Override the access key
    #[arg(long, global = true)]
    access_key: Option<String>,

    /// Override the secret key
    #[arg(long, global = true)]
    secret_key: Option<String>,

    /// Override the region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Override the bucket
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Never consult the OS secret store
    #[arg(long, global = true)]
    no_keychain: bool,

    /// Fail instead of prompting for the mnemonic
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mnemonic and key management
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Named connection profiles
    #[command(subcommand)]
    Vaults(VaultsCommand),
    /// Bucket operations
    #[command(subcommand)]
    Buckets(BucketsCommand),
    /// Encrypted object transfer
    #[command(subcommand)]
    Files(FilesCommand),
    /// Global defaults and config maintenance
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Generate a fresh 12-word mnemonic
    Generate,
    /// Validate a mnemonic phrase
    Verify {
        /// Phrase to check; prompted for when omitted
        phrase: Option<String>,
    },
    /// Re-encrypt the config under a new mnemonic
    Rotate {
        /// Generate the new mnemonic instead of prompting for one
        #[arg(long)]
        generate: bool,
    },
    /// Store the mnemonic in the OS secret store
    Login,
    /// Remove the mnemonic from the OS secret store
    Logout,
}

#[derive(Subcommand)]
enum VaultsCommand {
    /// List configured vaults
    List,
    /// Add a vault
    Add {
        name: String,
        #[command(flatten)]
        settings: VaultSettings,
    },
    /// Remove a vault
    Remove { name: String },
    /// Make a vault the default for future commands
    Use { name: String },
    /// Show a vault (secret key redacted)
    Show {
        /// Vault name; defaults to the active vault
        name: Option<String>,
    },
}

#[derive(Args)]
struct VaultSettings {
    #[arg(long)]
    endpoint: String,
    #[arg(long)]
    access_key: String,
    #[arg(long)]
    secret_key: String,
    #[arg(long)]
    region: String,
    #[arg(long)]
    bucket: Option<String>,
}

#[derive(Subcommand)]
enum BucketsCommand {
    /// List buckets owned by the credentials
    List,
    /// Create a bucket in the configured region
    Create { name: String },
    /// Delete an empty bucket
    Remove { name: String },
}

#[derive(Subcommand)]
enum FilesCommand {
    /// List objects, grouped by `/`
    List {
        /// Key prefix to list under
        prefix: Option<String>,
    },
    /// Encrypt and upload a local file
    Put {
        local: String,
        /// Destination key; defaults to the file name
        key: Option<String>,
    },
    /// Download and decrypt an object
    Get {
        key: String,
        /// Local destination; defaults to the key's file name
        local: Option<String>,
    },
    /// Delete an object
    Rm { key: String },
    /// Server-side copy (ciphertext moves as-is)
    Cp {
        source: String,
        dest: String,
        /// Copy from another bucket
        #[arg(long)]
        from_bucket: Option<String>,
    },
    /// Show stored and decrypted sizes of an object
    Stat { key: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration (secrets redacted)
    Show,
    /// Set global default connection settings
    SetDefault {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        access_key: Option<String>,
        #[arg(long)]
        secret_key: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Replace the config with a fresh one (NEW Data Key: existing
    /// uploads become undecryptable)
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("cybs3=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_env("CYBS3_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Keys(cmd) => run_keys(&cli, cmd),
        Commands::Vaults(cmd) => run_vaults(&cli, cmd),
        Commands::Config(cmd) => run_config(&cli, cmd),
        Commands::Buckets(_) | Commands::Files(_) => {
            let session = resolve_session(&cli)?;
            let result = match &cli.command {
                Commands::Buckets(cmd) => run_buckets(cmd, &session).await,
                Commands::Files(cmd) => run_files(cmd, &session).await,
                _ => unreachable!(),
            };
            session.client.shutdown();
            result
        }
    }
}

// ---- mnemonic / session plumbing -------------------------------------

fn prompt_mnemonic(label: &str) -> std::io::Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    rpassword::read_password()
}

fn keychain(cli: &Cli) -> Option<OsKeychain> {
    if cli.no_keychain {
        None
    } else {
        OsKeychain::available()
    }
}

fn resolve_session(cli: &Cli) -> Result<Session> {
    let options = SessionOptions {
        vault: cli.vault.clone(),
        endpoint: cli.endpoint.clone(),
        access_key: cli.access_key.clone(),
        secret_key: cli.secret_key.clone(),
        region: cli.region.clone(),
        bucket: cli.bucket.clone(),
    };
    let store = ConfigStore::new()?;
    let kc = keychain(cli);

    let prompt_fn: Box<dyn Fn() -> std::io::Result<String>> =
        Box::new(|| prompt_mnemonic("Mnemonic"));
    let prompt_ref = if cli.non_interactive {
        None
    } else {
        Some(prompt_fn.as_ref())
    };

    let session = session::resolve(
        &options,
        &store,
        kc.as_ref().map(|k| k as &dyn SecretStore),
        prompt_ref,
    )?;
    Ok(session)
}

/// Mnemonic + unlocked config for commands that do not need a client.
fn unlock_config(cli: &Cli) -> Result<(ConfigStore, Mnemonic, Config)> {
    let store = ConfigStore::new()?;
    let kc = keychain(cli);
    let prompt_fn: Box<dyn Fn() -> std::io::Result<String>> =
        Box::new(|| prompt_mnemonic("Mnemonic"));
    let prompt_ref = if cli.non_interactive {
        None
    } else {
        Some(prompt_fn.as_ref())
    };
    let mnemonic = session::resolve_mnemonic(
        kc.as_ref().map(|k| k as &dyn SecretStore),
        prompt_ref,
    )?;
    let (config, _) = store.load(&mnemonic)?;
    Ok((store, mnemonic, config))
}

// ---- keys ------------------------------------------------------------

fn run_keys(cli: &Cli, cmd: &KeysCommand) -> Result<()> {
    match cmd {
        KeysCommand::Generate => {
            let m = Mnemonic::generate()?;
            println!("{}", m.phrase());
            eprintln!("Write these 12 words down. They are the only way to unlock your config.");
            Ok(())
        }
        KeysCommand::Verify { phrase } => {
            let raw = match phrase {
                Some(p) => p.clone(),
                None => prompt_mnemonic("Mnemonic").context("reading mnemonic")?,
            };
            Mnemonic::parse(&raw)?;
            println!("mnemonic OK");
            Ok(())
        }
        KeysCommand::Rotate { generate } => {
            let kc = keychain(cli);
            let prompt_fn: Box<dyn Fn() -> std::io::Result<String>> =
                Box::new(|| prompt_mnemonic("Current mnemonic"));
            let old = session::resolve_mnemonic(
                kc.as_ref().map(|k| k as &dyn SecretStore),
                if cli.non_interactive { None } else { Some(prompt_fn.as_ref()) },
            )?;

            let new = if *generate {
                let m = Mnemonic::generate()?;
                println!("{}", m.phrase());
                eprintln!("Write the new mnemonic down before continuing to use this tool.");
                m
            } else {
                let raw = prompt_mnemonic("New mnemonic").context("reading new mnemonic")?;
                Mnemonic::parse(&raw)?
            };

            let store = ConfigStore::new()?;
            store.rotate_master(&old, &new)?;

            if let Some(kc) = &kc {
                if kc.exists() {
                    kc.save(&new.phrase())?;
                    eprintln!("OS secret store updated with the new mnemonic.");
                }
            }
            println!("config re-encrypted under the new mnemonic");
            Ok(())
        }
        KeysCommand::Login => {
            let kc = keychain(cli)
                .context("no usable OS secret store on this system")?;
            // Deliberately skip the keychain as a source here: login is
            // how the phrase gets *into* it.
            let prompt_fn: Box<dyn Fn() -> std::io::Result<String>> =
                Box::new(|| prompt_mnemonic("Mnemonic"));
            let m = session::resolve_mnemonic(
                None,
                if cli.non_interactive { None } else { Some(prompt_fn.as_ref()) },
            )?;
            kc.save(&m.phrase())?;
            println!("mnemonic stored in the OS secret store");
            Ok(())
        }
        KeysCommand::Logout => {
            let kc = keychain(cli)
                .context("no usable OS secret store on this system")?;
            kc.delete()?;
            println!("mnemonic removed from the OS secret store");
            Ok(())
        }
    }
}

// ---- vaults ----------------------------------------------------------

fn run_vaults(cli: &Cli, cmd: &VaultsCommand) -> Result<()> {
    let (store, mnemonic, mut config) = unlock_config(cli)?;

    match cmd {
        VaultsCommand::List => {
            if config.vaults.is_empty() {
                println!("no vaults configured");
                return Ok(());
            }
            for vault in &config.vaults {
                let marker = if config.active_vault_name.as_deref() == Some(&vault.name) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}  {}  {}", vault.name, vault.endpoint, vault.region);
            }
            Ok(())
        }
        VaultsCommand::Add { name, settings } => {
            if config.vault(name).is_some() {
                bail!("vault '{name}' already exists");
            }
            config.vaults.push(Vault {
                name: name.clone(),
                endpoint: settings.endpoint.clone(),
                access_key: settings.access_key.clone(),
                secret_key: settings.secret_key.clone(),
                region: settings.region.clone(),
                bucket: settings.bucket.clone(),
            });
            if config.active_vault_name.is_none() {
                config.active_vault_name = Some(name.clone());
            }
            store.save(&config, &mnemonic)?;
            println!("vault '{name}' added");
            Ok(())
        }
        VaultsCommand::Remove { name } => {
            let before = config.vaults.len();
            config.vaults.retain(|v| v.name != *name);
            if config.vaults.len() == before {
                bail!("vault '{name}' not found");
            }
            if config.active_vault_name.as_deref() == Some(name) {
                config.active_vault_name = None;
            }
            store.save(&config, &mnemonic)?;
            println!("vault '{name}' removed");
            Ok(())
        }
        VaultsCommand::Use { name } => {
            if config.vault(name).is_none() {
                bail!("vault '{name}' not found");
            }
            config.active_vault_name = Some(name.clone());
            store.save(&config, &mnemonic)?;
            println!("active vault is now '{name}'");
            Ok(())
        }
        VaultsCommand::Show { name } => {
            let name = name
                .clone()
                .or_else(|| config.active_vault_name.clone())
                .context("no vault named and no active vault set")?;
            let vault = config
                .vault(&name)
                .with_context(|| format!("vault '{name}' not found"))?;
            println!("name:       {}", vault.name);
            println!("endpoint:   {}", vault.endpoint);
            println!("region:     {}", vault.region);
            println!("access key: {}", vault.access_key);
            println!("secret key: {}", redact(&vault.secret_key));
            println!("bucket:     {}", vault.bucket.as_deref().unwrap_or("-"));
            Ok(())
        }
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &secret[..4])
    }
}

// ---- buckets ---------------------------------------------------------

async fn run_buckets(cmd: &BucketsCommand, session: &Session) -> Result<()> {
    let policy = RetryPolicy::default();
    match cmd {
        BucketsCommand::List => {
            let buckets = with_retry(&policy, || session.client.list_buckets()).await?;
            if buckets.is_empty() {
                println!("no buckets");
            }
            for bucket in buckets {
                println!("{bucket}");
            }
            Ok(())
        }
        BucketsCommand::Create { name } => {
            session.client.create_bucket(name).await?;
            println!("bucket '{name}' created");
            Ok(())
        }
        BucketsCommand::Remove { name } => {
            with_retry(&policy, || session.client.delete_bucket(name)).await?;
            println!("bucket '{name}' deleted");
            Ok(())
        }
    }
}

// ---- files -----------------------------------------------------------

async fn run_files(cmd: &FilesCommand, session: &Session) -> Result<()> {
    let policy = RetryPolicy::default();
    match cmd {
        FilesCommand::List { prefix } => {
            let entries = with_retry(&policy, || {
                session.client.list_objects(prefix.as_deref(), Some("/"))
            })
            .await?;
            if entries.is_empty() {
                println!("no objects");
                return Ok(());
            }
            for entry in entries {
                if entry.is_directory {
                    println!("{:>14}  {}", "-", entry.key);
                } else {
                    // Stored objects are ciphertext; show the logical size
                    // when the stored length is a valid frame sequence.
                    let size = match plaintext_length_for(entry.size) {
                        Some(p) => p.to_string(),
                        None => format!("{}?", entry.size),
                    };
                    println!(
                        "{size:>14}  {}  {}",
                        entry.last_modified.as_deref().unwrap_or("-"),
                        entry.key
                    );
                }
            }
            Ok(())
        }
        FilesCommand::Put { local, key } => {
            let key = match key {
                Some(k) => k.clone(),
                None => std::path::Path::new(local)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("cannot derive a key from the local path")?
                    .to_string(),
            };

            let file = tokio::fs::File::open(local)
                .await
                .with_context(|| format!("opening {local}"))?;
            let plain_len = file.metadata().await?.len();
            let stored_len = ciphertext_length_for(plain_len);

            let body = encrypt_stream(session.data_key.clone(), ReaderStream::new(file));
            session
                .client
                .put_object_stream(&key, body, stored_len)
                .await?;
            println!("{local} → {key}  ({plain_len} bytes, {stored_len} stored)");
            Ok(())
        }
        FilesCommand::Get { key, local } => {
            let local = match local {
                Some(l) => l.clone(),
                None => key
                    .rsplit('/')
                    .next()
                    .filter(|n| !n.is_empty())
                    .context("cannot derive a file name from the key")?
                    .to_string(),
            };

            let stored = session.client.get_object_stream(key).await?;
            let plain = decrypt_stream(session.data_key.clone(), stored);
            futures_util::pin_mut!(plain);

            let mut file = tokio::fs::File::create(&local)
                .await
                .with_context(|| format!("creating {local}"))?;
            let mut written: u64 = 0;
            while let Some(chunk) = plain.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            println!("{key} → {local}  ({written} bytes)");
            Ok(())
        }
        FilesCommand::Rm { key } => {
            with_retry(&policy, || session.client.delete_object(key)).await?;
            println!("deleted {key}");
            Ok(())
        }
        FilesCommand::Cp {
            source,
            dest,
            from_bucket,
        } => {
            session
                .client
                .copy_object(source, dest, from_bucket.as_deref())
                .await?;
            println!("copied {source} → {dest}");
            Ok(())
        }
        FilesCommand::Stat { key } => {
            let stored = with_retry(&policy, || session.client.head_object_size(key))
                .await?
                .with_context(|| format!("object not found: {key}"))?;
            println!("key:         {key}");
            println!("stored size: {stored}");
            match plaintext_length_for(stored) {
                Some(plain) => println!("size:        {plain}"),
                None => println!("size:        unknown (not a cybs3 object?)"),
            }
            Ok(())
        }
    }
}

// ---- config ----------------------------------------------------------

fn run_config(cli: &Cli, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let (_, _, config) = unlock_config(cli)?;
            println!("version:      {}", config.version);
            println!(
                "active vault: {}",
                config.active_vault_name.as_deref().unwrap_or("-")
            );
            println!("vaults:       {}", config.vaults.len());
            let s = &config.settings;
            println!(
                "defaults:     endpoint={} region={} bucket={}",
                s.default_endpoint.as_deref().unwrap_or("-"),
                s.default_region.as_deref().unwrap_or("-"),
                s.default_bucket.as_deref().unwrap_or("-"),
            );
            if let Some(ak) = &s.default_access_key {
                println!("              access_key={ak}");
            }
            if s.default_secret_key.is_some() {
                println!("              secret_key=****");
            }
            Ok(())
        }
        ConfigCommand::SetDefault {
            endpoint,
            access_key,
            secret_key,
            region,
            bucket,
        } => {
            let (store, mnemonic, mut config) = unlock_config(cli)?;
            let s = &mut config.settings;
            merge(&mut s.default_endpoint, endpoint);
            merge(&mut s.default_access_key, access_key);
            merge(&mut s.default_secret_key, secret_key);
            merge(&mut s.default_region, region);
            merge(&mut s.default_bucket, bucket);
            store.save(&config, &mnemonic)?;
            println!("defaults updated");
            Ok(())
        }
        ConfigCommand::Reset { force } => {
            if !force {
                bail!(
                    "config reset generates a NEW Data Key: objects uploaded with the \
                     current one become undecryptable. Pass --force to proceed."
                );
            }
            let store = ConfigStore::new()?;
            let kc = keychain(cli);
            let prompt_fn: Box<dyn Fn() -> std::io::Result<String>> =
                Box::new(|| prompt_mnemonic("Mnemonic"));
            let mnemonic = session::resolve_mnemonic(
                kc.as_ref().map(|k| k as &dyn SecretStore),
                if cli.non_interactive { None } else { Some(prompt_fn.as_ref()) },
            )?;
            let config = Config::fresh(&SymmetricKey::generate());
            store.save(&config, &mnemonic)?;
            println!("config reset; a fresh Data Key is in place");
            Ok(())
        }
    }
}

/// Apply an optional override; empty strings clear the field.
fn merge(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        if v.trim().is_empty() {
            *slot = None;
        } else {
            *slot = Some(v.clone());
        }
    }
}
