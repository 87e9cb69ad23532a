// The module is built separately for each integration test, so if some items
// are only used in one test but not the other, this will result in warnings
#![allow(dead_code)]

use std::{path::Path, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{Instrument, info_span};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};
use tristat::{
    PARTIES,
    domain::Ring,
    seal::SecretKey,
    store::{Record, share_records},
};
use tristat_http_server::{Participant, PartyConfig, Server, ServerOpts};
use url::Url;

/// Splits `records` into shares, binds three servers and returns their URLs once they run.
///
/// Only the parties listed in `running` are actually started.
pub(crate) async fn start_servers(
    ring: Ring,
    records: &[Record<i64>],
    dir: &Path,
    running: &[usize],
) -> Vec<Url> {
    let mut rng = StdRng::seed_from_u64(7);
    let stores = share_records(ring, records, &mut rng);
    let keys: Vec<SecretKey> = (0..PARTIES).map(|_| SecretKey::generate(&mut rng)).collect();

    let mut servers = vec![];
    let mut urls = vec![];
    for _ in 0..PARTIES {
        let opts = ServerOpts {
            retry_duration: Duration::from_millis(200),
        };
        let mut server =
            Server::new_with_opts("127.0.0.1:0".parse().expect("addr parse"), opts);
        let socket_addr = server.bind_socket().await.expect("bind");
        urls.push(Url::parse(&format!("http://{socket_addr}")).expect("url parse"));
        servers.push(server);
    }
    let participants: Vec<Participant> = urls
        .iter()
        .zip(&keys)
        .map(|(url, key)| Participant {
            url: url.clone(),
            public_key: key.public_key(),
        })
        .collect();

    for (party, (server, store)) in servers.into_iter().zip(stores).enumerate() {
        if !running.contains(&party) {
            continue;
        }
        let path = dir.join(format!("party{party}.json"));
        store.save(&path).expect("write store");
        let config = PartyConfig {
            party,
            ring,
            secret_key: keys[party].clone(),
            participants: participants.clone(),
            store: path,
            max_batch: 1 << 10,
        };
        let span = info_span!("server", party);
        tokio::spawn(
            async move { server.start(config).await.expect("tristat server crashed") }
                .instrument(span),
        );
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    urls
}

pub(crate) fn records(columns: &[(tristat::attribute::Attribute, &[i64])]) -> Vec<Record<i64>> {
    let n = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
    (0..n)
        .map(|i| columns.iter().map(|(attr, c)| (*attr, c[i])).collect())
        .collect()
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .try_init();
}
