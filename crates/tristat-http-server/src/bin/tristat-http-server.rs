//! An HTTP server running one party of a tristat deployment.
use std::{fs, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};
use tristat::{
    PARTIES,
    domain::Ring,
    seal::{PublicKey, SecretKey},
    store::{Record, share_records},
};
use tristat_http_server::{PartyConfig, Server, ServerOpts};

/// A HTTP-based server for three-party private statistics.
///
/// Logging can be controlled with an EnvFilter via the `TRISTAT_LOG` environment
/// variable.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server for the party described by a config file.
    Serve {
        /// The party configuration (JSON).
        #[arg(long, short)]
        config: PathBuf,
        /// The socket address to bind the server to.
        #[arg(long, short, default_value = "127.0.0.1:8123")]
        addr: SocketAddr,
        /// How long transient failures of requests to other parties are retried, in seconds.
        #[arg(long, default_value_t = 60)]
        retry_secs: u64,
    },
    /// Generate a fresh key pair and print it as JSON.
    Keygen,
    /// Split plaintext records into one share store per party.
    Split {
        /// A JSON list of records, each mapping attribute names to integers.
        #[arg(long, short)]
        input: PathBuf,
        /// The directory to write `party0.json`, `party1.json` and `party2.json` to.
        #[arg(long, short)]
        out_dir: PathBuf,
        /// Share modulo this prime instead of using wrapping 128-bit arithmetic.
        #[arg(long)]
        modulus: Option<u64>,
    },
}

#[derive(Serialize)]
struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    match Cli::parse().command {
        Command::Serve {
            config,
            addr,
            retry_secs,
        } => {
            let config = PartyConfig::load(&config).context("unable to load party config")?;
            let opts = ServerOpts {
                retry_duration: Duration::from_secs(retry_secs),
            };
            Server::new_with_opts(addr, opts).start(config).await
        }
        Command::Keygen => {
            let secret_key = SecretKey::generate(&mut rand::rng());
            let keys = KeyPair {
                public_key: secret_key.public_key(),
                secret_key,
            };
            println!("{}", serde_json::to_string_pretty(&keys)?);
            Ok(())
        }
        Command::Split {
            input,
            out_dir,
            modulus,
        } => split(input, out_dir, modulus),
    }
}

fn split(input: PathBuf, out_dir: PathBuf, modulus: Option<u64>) -> anyhow::Result<()> {
    let ring = match modulus {
        Some(modulus) => Ring::Prime { modulus },
        None => Ring::Wrapping,
    };
    ring.validate().context("invalid modulus")?;
    let json = fs::read_to_string(&input)
        .with_context(|| format!("unable to read {}", input.display()))?;
    let records: Vec<Record<i64>> =
        serde_json::from_str(&json).context("input is not a list of records")?;
    fs::create_dir_all(&out_dir).context("unable to create output directory")?;
    let stores = share_records(ring, &records, &mut rand::rng());
    for (party, store) in stores.iter().enumerate() {
        let path = out_dir.join(format!("party{party}.json"));
        store
            .save(&path)
            .with_context(|| format!("unable to write {}", path.display()))?;
    }
    info!(records = records.len(), parties = PARTIES, "split records into shares");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var("TRISTAT_LOG")
        .with_default_directive("tristat=info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    Ok(())
}
