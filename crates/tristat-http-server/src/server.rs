use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tokio::net::TcpListener;
use tracing::info;
use tristat::{party::Party, protocol::Orchestrator, store::MemoryStore, triples::TripleDealer};

use crate::{api::TristatState, config::PartyConfig, peer_client::HttpPeerClient, router};

/// An HTTP server running one of the three parties.
pub struct Server {
    addr: SocketAddr,
    opts: ServerOpts,
    listener: Option<TcpListener>,
}

/// Configuration options for a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerOpts {
    /// How long transient failures of requests to other parties are retried.
    pub retry_duration: Duration,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            retry_duration: Duration::from_secs(60),
        }
    }
}

impl Server {
    /// Create a new server for the provided address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            opts: ServerOpts::default(),
            listener: None,
        }
    }

    /// Create a new server for the provided address with options.
    pub fn new_with_opts(addr: SocketAddr, opts: ServerOpts) -> Self {
        Self {
            addr,
            opts,
            listener: None,
        }
    }

    /// Explicitly bind socket so provided address and return bound address.
    ///
    /// This is useful if the [`SocketAddr`] provided to [`Server::new`] had a port
    /// of `0`. The return address of this function will include the randomly chosen
    /// port by the OS.
    pub async fn bind_socket(&mut self) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .context("unable to bind to socket")?;
        let addr = listener
            .local_addr()
            .context("unable to get local addr of socket")?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Start the server as the party described by `config`.
    ///
    /// The party's shares are loaded once on startup.
    pub async fn start(self, config: PartyConfig) -> anyhow::Result<()> {
        let state = state(&config, &self.opts)?;
        info!(party = config.party, "starting tristat server on {}", self.addr);
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(&self.addr)
                .await
                .context("unable to bind to socket")?,
        };
        axum::serve(listener, router::router(state).into_make_service())
            .await
            .context("axum server error")?;
        Ok(())
    }
}

fn state(config: &PartyConfig, opts: &ServerOpts) -> anyhow::Result<TristatState> {
    config.validate().context("invalid party configuration")?;
    let store = MemoryStore::load(&config.store)
        .with_context(|| format!("unable to load shares from {}", config.store.display()))?;
    let party = Party::new(config.party, config.ring, config.secret_key.clone(), store)
        .context("unable to create party")?;
    let dealer = TripleDealer::new(config.ring, config.party, config.public_keys()?)
        .with_max_batch(config.max_batch);
    let peers = HttpPeerClient::new(client(opts)?, config.urls());
    Ok(TristatState::new(Orchestrator::new(
        Arc::new(party),
        peers,
        dealer,
    )))
}

fn client(opts: &ServerOpts) -> anyhow::Result<ClientWithMiddleware> {
    #[allow(unused_mut)]
    let mut builder = reqwest::ClientBuilder::new();

    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    {
        builder = builder.tcp_user_timeout(Duration::from_secs(10 * 60));
    }

    let reqwest_client = builder.build().context("unable to build HTTP client")?;

    let retry_policy =
        ExponentialBackoff::builder().build_with_total_retry_duration(opts.retry_duration);
    Ok(reqwest_middleware::ClientBuilder::new(reqwest_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}
