//! TSS Party CLI
//!
//! Command-line interface for threshold EdDSA:
//! - Simulate a full key generation and signing ceremony in-process
//! - Derive a child common keychain along a non-hardened path
//! - Verify a signature against a joint public key

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tss_eddsa_core::derive::derive_unhardened;
use tss_eddsa_core::keygen::run_keygen;
use tss_eddsa_core::mpc::MemoryRelay;
use tss_eddsa_core::sign::run_signing;
use tss_eddsa_core::verify::verify_bytes;
use tss_eddsa_core::{KeyShare, PartyIndex, SessionConfig, SessionId, Signature};

/// TSS Party - threshold Ed25519 ceremonies
#[derive(Parser)]
#[command(name = "tss-party")]
#[command(about = "Threshold EdDSA party node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run key generation and signing with one task per party
    Simulate {
        /// Number of parties
        #[arg(short = 'n', long, env = "TSS_PARTIES", default_value_t = tss_eddsa_core::DEFAULT_PARTIES)]
        parties: usize,

        /// Threshold (t-of-n)
        #[arg(short, long, env = "TSS_THRESHOLD", default_value_t = tss_eddsa_core::DEFAULT_THRESHOLD)]
        threshold: usize,

        /// Signing quorum (comma-separated party indices, 1-based)
        #[arg(short, long, env = "TSS_SIGNERS", value_delimiter = ',', default_value = "1,2")]
        signers: Vec<PartyIndex>,

        /// Message to sign
        #[arg(short, long)]
        message: String,

        /// Relay collect timeout in seconds
        #[arg(long, env = "TSS_TIMEOUT", default_value_t = 30)]
        timeout: u64,

        /// Directory to write key shares to
        #[arg(short, long, env = "DEST")]
        dest: Option<PathBuf>,

        /// Sign with the child key at this non-hardened path (e.g. m/0/1)
        #[arg(long)]
        path: Option<String>,
    },

    /// Derive a child common keychain
    Derive {
        /// Parent common keychain (hex, public key || chaincode)
        #[arg(short, long)]
        common_keychain: String,

        /// Non-hardened derivation path (e.g. m/0/1)
        #[arg(short, long)]
        path: String,
    },

    /// Verify a signature
    Verify {
        /// Joint public key (hex, 32 bytes)
        #[arg(short, long)]
        public_key: String,

        /// Signature (hex, 64 bytes)
        #[arg(short, long)]
        signature: String,

        /// Signed message
        #[arg(short, long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            parties,
            threshold,
            ref signers,
            ref message,
            timeout,
            ref dest,
            ref path,
        } => {
            simulate(
                parties,
                threshold,
                signers,
                message,
                timeout,
                dest.as_deref(),
                path.as_deref(),
            )
            .await?;
        }
        Commands::Derive {
            ref common_keychain,
            ref path,
        } => {
            let child = derive_unhardened(common_keychain, path)?;
            println!("Public Key: {}", &child[..64]);
            println!("Common Keychain: {}", child);
        }
        Commands::Verify {
            ref public_key,
            ref signature,
            ref message,
        } => {
            run_verify(public_key, signature, message)?;
        }
    }

    Ok(())
}

async fn simulate(
    n: usize,
    t: usize,
    signers: &[PartyIndex],
    message: &str,
    timeout: u64,
    dest: Option<&Path>,
    path: Option<&str>,
) -> Result<()> {
    info!(n_parties = n, threshold = t, signers = ?signers, "Starting simulation");
    if signers.is_empty() {
        bail!("at least one signer is required");
    }

    let relay = MemoryRelay::new().with_timeout(std::time::Duration::from_secs(timeout));
    let keygen_session: SessionId = rand::random();

    // Validate every config up front so no task is left waiting on a peer that never starts
    let configs = (1..=n)
        .map(|i| SessionConfig::new(keygen_session, n, t, i))
        .collect::<tss_eddsa_core::Result<Vec<_>>>()?;

    let mut handles = Vec::with_capacity(n);
    for config in configs {
        let relay = relay.clone();
        handles.push(tokio::spawn(async move {
            run_keygen(&config, None, &relay).await
        }));
    }
    let mut key_shares = Vec::with_capacity(n);
    for handle in handles {
        key_shares.push(handle.await??);
    }

    let first = &key_shares[0];
    println!(
        "Public Key: {}",
        hex::encode(first.joint_public_key.to_bytes())
    );
    println!("Common Keychain: {}", first.common_keychain());

    if let Some(dest) = dest {
        save_key_shares(dest, &key_shares)?;
    }

    if let Some(path) = path {
        key_shares = key_shares
            .iter()
            .map(|s| s.derive_child(path))
            .collect::<tss_eddsa_core::Result<Vec<_>>>()?;
        info!(path, "Derived child key shares");
        println!(
            "Derived Public Key: {}",
            hex::encode(key_shares[0].joint_public_key.to_bytes())
        );
    }

    let sign_session: SessionId = rand::random();
    let mut configs = Vec::with_capacity(signers.len());
    for &index in signers {
        let key_share = key_shares
            .iter()
            .find(|s| s.index == index)
            .with_context(|| format!("no party with index {}", index))?;
        configs.push((
            key_share.clone(),
            SessionConfig::for_signing(sign_session, key_share, signers)?,
        ));
    }

    let mut handles = Vec::with_capacity(configs.len());
    for (key_share, config) in configs {
        let relay = relay.clone();
        let message = message.as_bytes().to_vec();
        handles.push(tokio::spawn(async move {
            run_signing(&key_share, &message, &config, &relay).await
        }));
    }
    let mut signatures: Vec<Signature> = Vec::with_capacity(handles.len());
    for handle in handles {
        signatures.push(handle.await??);
    }

    let signature = signatures[0];
    if signatures.iter().any(|s| *s != signature) {
        bail!("parties produced different signatures");
    }

    info!(
        r = hex::encode(signature.r.to_bytes()),
        sigma = hex::encode(signature.sigma.to_bytes()),
        "Simulation completed"
    );
    println!("Signature: {}", hex::encode(signature.to_bytes()));

    Ok(())
}

fn save_key_shares(dest: &Path, key_shares: &[KeyShare]) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for key_share in key_shares {
        let path = dest.join(format!("keyshare.{}.json", key_share.index));
        let json = serde_json::to_string_pretty(key_share)?;
        std::fs::write(&path, json)?;
        info!(path = ?path, "Key share saved");
    }
    Ok(())
}

fn run_verify(public_key: &str, signature: &str, message: &str) -> Result<()> {
    let public_key = hex::decode(public_key).context("public key is not hex")?;
    let signature = hex::decode(signature).context("signature is not hex")?;

    if verify_bytes(message.as_bytes(), &signature, &public_key)? {
        println!("Signature: valid");
        Ok(())
    } else {
        bail!("signature is not valid for this message and key")
    }
}
