//! An HTTP server running one party of a tristat deployment.
//!
//! Every party runs the same server. It answers the requests of the orchestrating party
//! (`/sum`, `/beaver_mask` and `/beaver_compute`) from its own share store and can itself act as
//! the orchestrator for a statistic requested via `/compute/{kind}`. Requests to the other
//! parties are made by an [`HttpPeerClient`], which retries transient failures with exponential
//! backoff. Retries resend the identical request, so no masks are ever regenerated within a round.
//!
//! # CAUTION: Authentication
//!
//! The server does not authenticate the other parties. Deploy it behind a proxy providing mutual
//! authentication (e.g. mTLS) if untrusted requests can reach it. Triple shares are sealed for
//! their recipient, but the masked values exchanged between the parties are not.
//!
//! [`HttpPeerClient`]: crate::peer_client::HttpPeerClient
#![allow(rustdoc::private_intra_doc_links)]
use std::fmt::Write;

mod api;
mod config;
mod peer_client;
mod router;
mod server;

pub use config::{ConfigError, Participant, PartyConfig};
pub use server::{Server, ServerOpts};

fn serialize_error_chain<S>(
    err: &(dyn std::error::Error + 'static),
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_error_chain(err))
}

fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = anyhow::Chain::new(err).peekable();
    let mut f = String::new();
    if let Some(err) = chain.next() {
        let _ = writeln!(&mut f, "Error: {}", err);
    }
    if chain.peek().is_some() {
        let _ = writeln!(&mut f, "\nCaused by:");
    }
    for err in chain {
        let _ = writeln!(&mut f, "\t{}", err);
    }
    f
}
