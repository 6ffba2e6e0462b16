use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use relaymls_core::core_mls::traits::ciphersuite::extension_name;
use relaymls_core::core_mls::{
    GroupCreatedRecord, GroupJoinedRecord, MemoryIdentityProvider, NostrGroupDataRecord,
    ProcessedMessage, WelcomePreviewRecord,
};
use relaymls_core::logging::{init_logging_with_config, LogConfig};
use relaymls_core::{metrics, Config, CreateGroupParams, GroupId, MlsSession, StorageBackend};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relaymls")]
#[command(author, version, about = "MLS group sessions for Nostr relays", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "RELAYMLS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the per-identity database
    #[arg(long)]
    data_dir: Option<String>,

    /// Local identity; also names the database file
    #[arg(short, long, env = "RELAYMLS_IDENTITY", default_value = "default")]
    identity: String,

    /// Hex 32-byte seed for the identity's signing key
    #[arg(long, env = "RELAYMLS_IDENTITY_SEED", hide_env_values = true)]
    identity_seed: Option<String>,

    /// Keep all state in memory for this invocation
    #[arg(long)]
    memory: bool,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the ciphersuite, extensions and storage location
    Info,
    /// Manage key packages
    #[command(subcommand)]
    KeyPackage(KeyPackageCommand),
    /// Create and manage groups
    #[command(subcommand)]
    Group(GroupCommand),
    /// Inspect or accept welcomes
    #[command(subcommand)]
    Welcome(WelcomeCommand),
    /// Encrypt or process group messages
    #[command(subcommand)]
    Message(MessageCommand),
}

#[derive(Subcommand, Debug)]
enum KeyPackageCommand {
    /// Issue a key package for the local identity
    Issue {
        /// Relay hints; defaults to the configured relays
        #[arg(long = "relay")]
        relays: Vec<String>,
    },
    /// Decode and verify a hex key package
    Parse { key_package: String },
    /// Delete a local key package
    Delete { key_package: String },
    /// List local key package references
    List,
    /// Delete expired local key packages
    Purge,
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Hex key package of an invited member, repeatable
    #[arg(long = "member", required = true)]
    members: Vec<String>,
    /// Admin identity, repeatable; the creator is always an admin
    #[arg(long = "admin")]
    admins: Vec<String>,
    #[arg(long = "relay")]
    relays: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    /// Create a group and print its welcomes
    Create(CreateArgs),
    /// List local groups
    List,
    /// Show a group's roster and metadata
    Show { group_id: String },
    /// Print the exporter secret of the current epoch
    ExportSecret { group_id: String },
    /// Add members by key package
    Add {
        group_id: String,
        #[arg(required = true)]
        key_packages: Vec<String>,
    },
    /// Remove members by identity
    Remove {
        group_id: String,
        #[arg(required = true)]
        identities: Vec<String>,
    },
    /// Rotate the local leaf key
    Update { group_id: String },
    /// Delete a group and its secrets
    Delete { group_id: String },
}

#[derive(Subcommand, Debug)]
enum WelcomeCommand {
    /// Show what a welcome contains without joining
    Preview { welcome: String },
    /// Join the group a welcome invites to
    Join { welcome: String },
}

#[derive(Subcommand, Debug)]
enum MessageCommand {
    /// Encrypt a UTF-8 payload
    Encrypt {
        group_id: String,
        payload: String,
        /// Treat the payload as hex-encoded bytes
        #[arg(long)]
        hex: bool,
    },
    /// Decrypt a hex message or apply a hex commit
    Process { group_id: String, message: String },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(dir) = &cli.data_dir {
        config.session.data_dir = PathBuf::from(shellexpand::tilde(dir).as_ref());
    }
    if cli.memory {
        config.session.storage = StorageBackend::Memory;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

async fn open_session(cli: &Cli, config: &Config) -> Result<MlsSession> {
    let identities = MemoryIdentityProvider::new();
    match &cli.identity_seed {
        Some(seed) => {
            let seed: [u8; 32] = hex::decode(seed)
                .context("identity seed is not hex")?
                .try_into()
                .map_err(|_| anyhow::anyhow!("identity seed must be 32 bytes"))?;
            identities.register_seed(&cli.identity, &seed).await;
        }
        None => {
            warn!(
                identity = %cli.identity,
                "No identity seed given; signing with a one-off key"
            );
            identities.register(&cli.identity).await;
        }
    }

    let session = MlsSession::init_with_identities(
        &config.session.data_dir,
        &cli.identity,
        config.session.clone(),
        Arc::new(identities),
    )?;
    Ok(session)
}

fn group_id(hex_id: &str) -> Result<GroupId> {
    GroupId::from_hex(hex_id).context("group id is not hex")
}

fn bytes(hex_value: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(hex_value.trim()).with_context(|| format!("{} is not hex", what))
}

async fn run(cli: &Cli, config: &Config, session: &MlsSession) -> Result<serde_json::Value> {
    let output = match &cli.command {
        Command::Info => json!({
            "identity": session.identity(),
            "ciphersuite": format!("0x{:04x}", session.ciphersuite()),
            "ciphersuite_name": session.ciphersuite_name(),
            "extensions": session
                .extensions()
                .into_iter()
                .map(|e| json!({ "id": format!("0x{:04x}", e), "name": extension_name(e) }))
                .collect::<Vec<_>>(),
            "storage": match config.session.storage {
                StorageBackend::Sqlite => json!(config.session.data_dir),
                StorageBackend::Memory => json!("memory"),
            },
        }),

        Command::KeyPackage(cmd) => match cmd {
            KeyPackageCommand::Issue { relays } => {
                let (key_package, encoded) = if relays.is_empty() {
                    session.issue_key_package(&cli.identity).await?
                } else {
                    session.issue_key_package_with_relays(&cli.identity, relays.clone()).await?
                };
                json!({
                    "key_package": encoded.to_hex(),
                    "identity": key_package.identity,
                    "relays": key_package.relays,
                    "not_after": key_package.lifetime.not_after,
                })
            }
            KeyPackageCommand::Parse { key_package } => {
                let parsed = session.parse_key_package(&bytes(key_package, "key package")?)?;
                json!({
                    "identity": parsed.identity,
                    "identity_key": hex::encode(&parsed.identity_key),
                    "init_key": hex::encode(&parsed.init_key),
                    "ciphersuite": format!("0x{:04x}", parsed.ciphersuite),
                    "extensions": parsed.extensions,
                    "relays": parsed.relays,
                    "not_before": parsed.lifetime.not_before,
                    "not_after": parsed.lifetime.not_after,
                })
            }
            KeyPackageCommand::Delete { key_package } => {
                session.delete_key_package(&bytes(key_package, "key package")?).await?;
                json!({ "deleted": true })
            }
            KeyPackageCommand::List => {
                let refs = session.list_key_packages().await?;
                json!(refs.iter().map(|r| r.to_hex()).collect::<Vec<_>>())
            }
            KeyPackageCommand::Purge => {
                json!({ "purged": session.purge_expired_key_packages().await? })
            }
        },

        Command::Group(cmd) => match cmd {
            GroupCommand::Create(args) => {
                let member_key_packages = args
                    .members
                    .iter()
                    .map(|kp| bytes(kp, "member key package"))
                    .collect::<Result<Vec<_>>>()?;
                let created = session
                    .create_group(CreateGroupParams {
                        name: args.name.clone(),
                        description: args.description.clone(),
                        member_key_packages,
                        creator_identity: cli.identity.clone(),
                        admin_identities: args.admins.clone(),
                        relays: args.relays.clone(),
                    })
                    .await?;
                serde_json::to_value(GroupCreatedRecord::from_created(&created)?)?
            }
            GroupCommand::List => {
                let groups = session.groups().await?;
                json!(groups.iter().map(GroupId::to_hex).collect::<Vec<_>>())
            }
            GroupCommand::Show { group_id: id } => {
                let state = session.group(&group_id(id)?).await?;
                json!({
                    "group_id": state.group_id().to_hex(),
                    "epoch": state.epoch(),
                    "own_leaf": state.own_leaf_index(),
                    "members": state
                        .members()
                        .iter()
                        .map(|m| json!({ "leaf": m.leaf_index, "identity": m.identity }))
                        .collect::<Vec<_>>(),
                    "group_data": NostrGroupDataRecord::from(state.group_data()),
                })
            }
            GroupCommand::ExportSecret { group_id: id } => {
                let (secret, epoch) = session.exporter_secret(&group_id(id)?).await?;
                json!({ "secret": hex::encode(secret), "epoch": epoch })
            }
            GroupCommand::Add { group_id: id, key_packages } => {
                let key_packages = key_packages
                    .iter()
                    .map(|kp| bytes(kp, "key package"))
                    .collect::<Result<Vec<_>>>()?;
                let output = session.add_members(&group_id(id)?, &key_packages).await?;
                commit_json(output)?
            }
            GroupCommand::Remove { group_id: id, identities } => {
                let output = session.remove_members(&group_id(id)?, identities).await?;
                commit_json(output)?
            }
            GroupCommand::Update { group_id: id } => {
                commit_json(session.self_update(&group_id(id)?).await?)?
            }
            GroupCommand::Delete { group_id: id } => {
                session.delete_group(&group_id(id)?).await?;
                json!({ "deleted": true })
            }
        },

        Command::Welcome(cmd) => match cmd {
            WelcomeCommand::Preview { welcome } => {
                let preview = session.preview_welcome(&bytes(welcome, "welcome")?).await?;
                serde_json::to_value(WelcomePreviewRecord::from(&preview))?
            }
            WelcomeCommand::Join { welcome } => {
                let joined = session.join_from_welcome(&bytes(welcome, "welcome")?).await?;
                serde_json::to_value(GroupJoinedRecord::from(&joined))?
            }
        },

        Command::Message(cmd) => match cmd {
            MessageCommand::Encrypt { group_id: id, payload, hex } => {
                let payload =
                    if *hex { bytes(payload, "payload")? } else { payload.as_bytes().to_vec() };
                let message = session.encrypt_message(&group_id(id)?, &payload).await?;
                json!({ "message": hex::encode(message.to_bytes()?), "epoch": message.epoch })
            }
            MessageCommand::Process { group_id: id, message } => {
                let processed =
                    session.process_message(&group_id(id)?, &bytes(message, "message")?).await?;
                match processed {
                    ProcessedMessage::Application { sender_identity, sender_leaf, payload } => {
                        let mut output = json!({
                            "type": "application",
                            "sender": sender_identity,
                            "sender_leaf": sender_leaf,
                        });
                        let (field, value) = payload_field(payload);
                        output[field] = value;
                        output
                    }
                    ProcessedMessage::Commit { epoch } => json!({ "type": "commit", "epoch": epoch }),
                    ProcessedMessage::Removed => json!({ "type": "removed" }),
                }
            }
        },
    };

    Ok(output)
}

/// Payloads print as text when they are UTF-8 and as hex otherwise
fn payload_field(payload: Vec<u8>) -> (&'static str, serde_json::Value) {
    match String::from_utf8(payload) {
        Ok(text) => ("payload", json!(text)),
        Err(e) => ("payload_hex", json!(hex::encode(e.into_bytes()))),
    }
}

fn commit_json(output: relaymls_core::CommitOutput) -> Result<serde_json::Value> {
    let welcomes = output
        .welcomes
        .iter()
        .map(|w| w.to_bytes().map(hex::encode))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "commit": hex::encode(output.commit.to_bytes()?),
        "welcomes": welcomes,
        "epoch": output.epoch,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    if config.metrics.enabled {
        metrics::init_metrics();
    }

    let session = open_session(&cli, &config).await?;
    info!(identity = %cli.identity, "relaymls started");

    let output = run(&cli, &config, &session).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if cli.memory && matches!(cli.command, Command::Group(_) | Command::Message(_)) {
        warn!("State was kept in memory and is now discarded");
    }

    Ok(())
}
