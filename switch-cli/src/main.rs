//! Operator-facing CLI for the owner and recipient sides of a dead
//! man's switch, mirroring `oprf-dev-client`'s shape: one binary, one
//! comma-separated list of node URLs, and a subcommand per operation.
//!
//! Unlike `oprf-dev-client`, which drives the OPRF protocol directly
//! against OPRF services, this CLI never touches a switch-watcher's
//! store directly: it talks `switch_client`'s protocol functions against
//! an [`http_substrate::HttpSubstrate`] that fans publishes and
//! snapshots out across the configured watchers (`src/http_substrate.rs`),
//! and the watchers' own `/switches` endpoint for the aggregate itself.

use std::time::{Duration, SystemTime};

use clap::{Parser, Subcommand};
use eyre::Context as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use secrecy::{ExposeSecret, SecretString};
use switch_client::enroll::{EnrollParams, WatcherTarget, enroll};
use switch_client::owner::{self, PublishRetry};
use switch_client::recovery::{self, RecoveryParams};
use switch_core::schnorr::{PrivateKey, PublicKey as SigningPublicKey};
use switch_core::sealed_box::RecipientKeyPair;
use switch_core::shamir::AuthKey;
use switch_types::ids::{RecipientId, SwitchId, WatcherId};
use switch_types::switch::{Switch, ThresholdParams};

mod http_substrate;

use http_substrate::HttpSubstrate;

/// One watcher to enroll, as `watcher-id@hex-x25519-public-key`.
#[derive(Clone, Debug)]
struct WatcherSpec {
    watcher_id: WatcherId,
    public_key: [u8; 32],
}

fn parse_watcher_spec(s: &str) -> Result<WatcherSpec, String> {
    let (id, key) = s
        .split_once('@')
        .ok_or_else(|| format!("expected watcher-id@public-key-hex, got {s}"))?;
    let watcher_id =
        WatcherId::from_uuid(uuid::Uuid::parse_str(id).map_err(|err| format!("parsing watcher id: {err}"))?);
    let public_key = decode_key(key).map_err(|err| err.to_string())?;
    Ok(WatcherSpec { watcher_id, public_key })
}

/// One recipient to enroll, as `recipient-id@hex-x25519-public-key`.
#[derive(Clone, Debug)]
struct RecipientSpec {
    recipient_id: RecipientId,
    public_key: [u8; 32],
}

fn parse_recipient_spec(s: &str) -> Result<RecipientSpec, String> {
    let (id, key) = s
        .split_once('@')
        .ok_or_else(|| format!("expected recipient-id@public-key-hex, got {s}"))?;
    let recipient_id =
        RecipientId::from_uuid(uuid::Uuid::parse_str(id).map_err(|err| format!("parsing recipient id: {err}"))?);
    let public_key = decode_key(key).map_err(|err| err.to_string())?;
    Ok(RecipientSpec { recipient_id, public_key })
}

fn decode_key(hex_str: &str) -> eyre::Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).context("decoding hex key")?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| eyre::eyre!("expected a 32-byte key, got {} bytes", bytes.len()))
}

fn parse_switch_id(s: &str) -> Result<SwitchId, String> {
    uuid::Uuid::parse_str(s).map(SwitchId::from_uuid).map_err(|err| err.to_string())
}

fn parse_recipient_id(s: &str) -> Result<RecipientId, String> {
    uuid::Uuid::parse_str(s).map(RecipientId::from_uuid).map_err(|err| err.to_string())
}

#[derive(Clone, Debug, Parser)]
struct EnrollCommand {
    /// This owner's local account identifier.
    #[clap(long)]
    owner_id: uuid::Uuid,
    /// Path to the plaintext payload to seal. Read fully into memory.
    #[clap(long)]
    payload_path: std::path::PathBuf,
    /// The owner's password, used to derive the switch's master key.
    #[clap(long, env = "SWITCH_CLI_PASSWORD")]
    password: SecretString,
    /// Hex-encoded KDF salt. Must be at least 16 bytes.
    #[clap(long)]
    kdf_salt: String,
    /// PBKDF2 iteration count.
    #[clap(long, default_value_t = switch_core::kdf::MIN_KDF_ITERATIONS)]
    kdf_iterations: u32,
    /// Total watchers `N`.
    #[clap(long)]
    n: u8,
    /// Reconstruction threshold `M`.
    #[clap(long)]
    m: u8,
    /// One entry per watcher, as `watcher-id@hex-public-key`. Must have
    /// exactly `n` entries, in the same order as `--watcher-url`.
    #[clap(long = "watcher", value_delimiter = ',', value_parser = parse_watcher_spec)]
    watchers: Vec<WatcherSpec>,
    /// One entry per recipient, as `recipient-id@hex-public-key`.
    #[clap(long = "recipient", value_delimiter = ',', value_parser = parse_recipient_spec)]
    recipients: Vec<RecipientSpec>,
    /// Refresh interval before a missed heartbeat starts the release clock.
    #[clap(long, value_parser = humantime::parse_duration, default_value = "7days")]
    interval: Duration,
    /// Hex-encoded owner signing private key (32-byte secp256k1 scalar).
    #[clap(long, env = "SWITCH_CLI_SIGNING_KEY")]
    signing_key: SecretString,
    /// Publish per-coefficient commitments alongside each share.
    #[clap(long)]
    publish_commitments: bool,
}

#[derive(Clone, Debug, Parser)]
struct RefreshCommand {
    /// The switch to heartbeat.
    #[clap(long, value_parser = parse_switch_id)]
    switch_id: SwitchId,
    /// Strictly greater than every counter this key has signed before
    /// for this switch.
    #[clap(long)]
    counter: u64,
    /// Hex-encoded owner signing private key.
    #[clap(long, env = "SWITCH_CLI_SIGNING_KEY")]
    signing_key: SecretString,
}

#[derive(Clone, Debug, Parser)]
struct CancelCommand {
    /// The switch to cancel.
    #[clap(long, value_parser = parse_switch_id)]
    switch_id: SwitchId,
    /// Hex-encoded owner signing private key.
    #[clap(long, env = "SWITCH_CLI_SIGNING_KEY")]
    signing_key: SecretString,
}

#[derive(Clone, Debug, Parser)]
struct RecoverCommand {
    /// The switch to recover.
    #[clap(long, value_parser = parse_switch_id)]
    switch_id: SwitchId,
    /// This recipient's identifier.
    #[clap(long, value_parser = parse_recipient_id)]
    recipient_id: RecipientId,
    /// Hex-encoded recipient X25519 private scalar.
    #[clap(long, env = "SWITCH_CLI_RECIPIENT_KEY")]
    recipient_key: SecretString,
    /// Hex-encoded share-authentication key, obtained out of band from
    /// the owner.
    #[clap(long, env = "SWITCH_CLI_AUTH_KEY")]
    auth_key: SecretString,
    /// Hex-encoded owner signing public key.
    #[clap(long)]
    owner_signing_public_key: String,
    /// Wall-clock budget for the whole recovery attempt.
    #[clap(long, value_parser = humantime::parse_duration, default_value = "2min")]
    overall_timeout: Duration,
    /// Where to write the recovered payload. Defaults to stdout.
    #[clap(long)]
    output_path: Option<std::path::PathBuf>,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Package a payload into a new switch and publish its shares.
    Enroll(EnrollCommand),
    /// Prove the owner is alive, resetting the release clock.
    Refresh(RefreshCommand),
    /// Cancel a switch outright.
    Cancel(CancelCommand),
    /// Reassemble and decrypt a released payload.
    Recover(RecoverCommand),
}

/// Configuration shared by every subcommand.
#[derive(Parser, Debug)]
#[command(name = "switch-cli", about = "Owner and recipient CLI for a dead man's switch")]
struct CliConfig {
    /// The watchers this switch is (or will be) enrolled with, e.g.
    /// `http://127.0.0.1:8080,http://127.0.0.1:8081`.
    #[clap(long, env = "SWITCH_CLI_WATCHERS", value_delimiter = ',')]
    watcher_urls: Vec<String>,
    /// How often to re-poll a watcher's snapshot endpoint while waiting
    /// for new records.
    #[clap(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    poll_interval: Duration,
    /// Bound on how long enrollment waits for each watcher's ack.
    #[clap(long, value_parser = humantime::parse_duration, default_value = "10s")]
    ack_timeout: Duration,
    #[command(subcommand)]
    command: Command,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing();
    let config = CliConfig::parse();
    if config.watcher_urls.is_empty() {
        eyre::bail!("at least one --watcher-urls entry is required");
    }
    let substrate = HttpSubstrate::new(config.watcher_urls.clone(), config.poll_interval);

    match config.command.clone() {
        Command::Enroll(cmd) => run_enroll(&config, cmd, &substrate).await,
        Command::Refresh(cmd) => run_refresh(cmd, &substrate).await,
        Command::Cancel(cmd) => run_cancel(cmd, &substrate).await,
        Command::Recover(cmd) => run_recover(&config, cmd, &substrate).await,
    }
}

async fn run_enroll(config: &CliConfig, cmd: EnrollCommand, substrate: &HttpSubstrate) -> eyre::Result<()> {
    if cmd.watchers.len() != cmd.n as usize {
        eyre::bail!("--watcher was given {} times, expected n={}", cmd.watchers.len(), cmd.n);
    }
    let threshold = ThresholdParams::new(cmd.n, cmd.m).map_err(|err| eyre::eyre!("{err}"))?;
    let payload = std::fs::read(&cmd.payload_path).context("reading payload file")?;
    let kdf_salt = hex::decode(&cmd.kdf_salt).context("decoding kdf salt")?;
    let signing_key_bytes = decode_key(cmd.signing_key.expose_secret())?;
    let signing_key = PrivateKey::from_bytes(&signing_key_bytes).map_err(|err| eyre::eyre!("{err}"))?;

    let watcher_targets: Vec<WatcherTarget> = cmd
        .watchers
        .iter()
        .map(|w| WatcherTarget {
            watcher_id: w.watcher_id,
            public_key: w.public_key,
        })
        .collect();
    let recipients: Vec<(RecipientId, [u8; 32])> =
        cmd.recipients.iter().map(|r| (r.recipient_id, r.public_key)).collect();

    let mut rng = StdRng::from_entropy();
    let params = EnrollParams {
        owner_id: cmd.owner_id,
        payload: &payload,
        password: cmd.password.expose_secret().as_bytes(),
        kdf_salt: &kdf_salt,
        kdf_iterations: cmd.kdf_iterations,
        threshold,
        watchers: &watcher_targets,
        recipients: &recipients,
        interval: cmd.interval,
        owner_signing_key: &signing_key,
        publish_commitments: cmd.publish_commitments,
        created_at: SystemTime::now(),
    };

    let output = enroll(params, substrate, config.ack_timeout, &mut rng)
        .await
        .context("enrollment failed")?;

    for watcher_url in &config.watcher_urls {
        let url = format!("{watcher_url}/switches");
        let response = reqwest::Client::new()
            .post(&url)
            .json(&output.switch)
            .send()
            .await
            .with_context(|| format!("submitting switch to {watcher_url}"))?;
        if !response.status().is_success() {
            tracing::warn!(%watcher_url, status = %response.status(), "watcher rejected switch submission");
        }
    }

    println!("switch id: {}", output.switch.id());
    println!("auth key (hand to recipients out of band): {}", hex::encode(output.auth_key.expose()));
    for ack in &output.watcher_acks {
        match &ack.result {
            Ok(()) => println!("watcher {}: share accepted", ack.watcher_id),
            Err(err) => println!("watcher {}: FAILED - {err}", ack.watcher_id),
        }
    }
    Ok(())
}

async fn run_refresh(cmd: RefreshCommand, substrate: &HttpSubstrate) -> eyre::Result<()> {
    let signing_key_bytes = decode_key(cmd.signing_key.expose_secret())?;
    let signing_key = PrivateKey::from_bytes(&signing_key_bytes).map_err(|err| eyre::eyre!("{err}"))?;
    owner::refresh(
        &signing_key,
        cmd.switch_id,
        cmd.counter,
        SystemTime::now(),
        substrate,
        PublishRetry::default(),
    )
    .await
    .context("refresh failed")?;
    println!("refreshed switch {} at counter {}", cmd.switch_id, cmd.counter);
    Ok(())
}

async fn run_cancel(cmd: CancelCommand, substrate: &HttpSubstrate) -> eyre::Result<()> {
    let signing_key_bytes = decode_key(cmd.signing_key.expose_secret())?;
    let signing_key = PrivateKey::from_bytes(&signing_key_bytes).map_err(|err| eyre::eyre!("{err}"))?;
    owner::cancel(&signing_key, cmd.switch_id, SystemTime::now(), substrate, PublishRetry::default())
        .await
        .context("cancellation failed")?;
    println!("cancelled switch {}", cmd.switch_id);
    Ok(())
}

async fn run_recover(config: &CliConfig, cmd: RecoverCommand, substrate: &HttpSubstrate) -> eyre::Result<()> {
    let recipient_key_bytes = decode_key(cmd.recipient_key.expose_secret())?;
    let recipient_keys = RecipientKeyPair::from_scalar(recipient_key_bytes);
    let auth_key_bytes = decode_key(cmd.auth_key.expose_secret())?;
    let auth_key = AuthKey::from_bytes(auth_key_bytes);
    let owner_signing_public_key_bytes = decode_key(&cmd.owner_signing_public_key)?;
    let owner_signing_public_key = SigningPublicKey::from_bytes(owner_signing_public_key_bytes)
        .ok_or_else(|| eyre::eyre!("malformed owner signing public key"))?;

    let first_watcher = &config.watcher_urls[0];
    let switch: Switch = reqwest::Client::new()
        .get(format!("{first_watcher}/switches/{}", cmd.switch_id))
        .send()
        .await
        .with_context(|| format!("fetching switch from {first_watcher}"))?
        .json()
        .await
        .context("decoding switch from watcher")?;

    let params = RecoveryParams {
        switch_id: cmd.switch_id,
        recipient_id: cmd.recipient_id,
        recipient_keys: &recipient_keys,
        auth_key: &auth_key,
        owner_signing_public_key,
        threshold: switch.threshold().m() as usize,
        sealed_payload: switch.sealed_payload(),
        overall_timeout: cmd.overall_timeout,
    };
    let payload = recovery::recover(params, substrate)
        .await
        .map_err(|err| eyre::eyre!("{err}"))?;

    match cmd.output_path {
        Some(path) => {
            std::fs::write(&path, &payload).with_context(|| format!("writing recovered payload to {path:?}"))?;
            println!("recovered payload written to {path:?}");
        }
        None => {
            use std::io::Write as _;
            std::io::stdout().write_all(&payload).context("writing recovered payload to stdout")?;
        }
    }
    Ok(())
}
