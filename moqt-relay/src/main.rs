//! CLI entry point wiring `moqt-native`'s QUIC transport to `moqt-core`'s
//! relay endpoint (grounded on `moq-relay-ietf/src/main.rs`'s `Cli`/`main`
//! split; the clustering flags that file carries - `--announce`, `--api`,
//! `--node` - have no counterpart here, since federation across relays is
//! out of scope).

mod relay;

use std::net;
use std::sync::Arc;

use clap::Parser;
use moqt_core::endpoint::{Config as CoreConfig, Endpoint};
use moqt_core::store::DataStore;
use moqt_core::transport::Transport;
use moqt_core::SubscribeId;
use moqt_native::quic;
use moqt_native::{Endpoint as QuicEndpoint, QuicTransport};

#[derive(Parser, Clone)]
pub struct Cli {
    #[command(flatten)]
    pub quic: quic::Args,

    /// Number of worker tasks draining the subscription engine (spec.md §5:
    /// "configurable size").
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Upstream relay to mirror tracks from, e.g. `origin.example.com:4443`.
    #[arg(long)]
    pub upstream: Option<net::SocketAddr>,

    /// TLS server name to present to `--upstream`.
    #[arg(long, default_value = "localhost")]
    pub upstream_name: String,

    /// A `namespace/name` track to mirror from `--upstream`. Repeat for
    /// multiple tracks; ignored unless `--upstream` is set.
    #[arg(long = "mirror")]
    pub mirrors: Vec<String>,
}

fn split_mirror(spec: &str) -> anyhow::Result<(String, String)> {
    let (namespace, name) = spec
        .rsplit_once('/')
        .ok_or_else(|| anyhow::anyhow!("--mirror {spec:?} must be namespace/name"))?;
    Ok((namespace.to_string(), name.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut core_config = CoreConfig::default();
    core_config.execution_config.worker_count = cli.workers;

    let store = DataStore::new();
    let server = Endpoint::new_server(core_config.clone(), store.clone());
    for _ in 0..cli.workers {
        let engine = server.engine().clone();
        tokio::spawn(async move { engine.run_worker().await });
    }

    let native_config = cli.quic.load()?;
    let mut listener = QuicEndpoint::new(native_config)?;
    log::info!("listening on {}", listener.local_addr()?);

    let downstream_transport: Arc<QuicTransport> = QuicTransport::new(Arc::new(server.clone()));

    if let Some(upstream_addr) = cli.upstream {
        let client_native_config = quic::Args {
            bind: "[::]:0".parse().unwrap(),
            tls: cli.quic.tls.clone(),
        }
        .load()?;
        let client_tls = client_native_config.tls.client.clone();
        let native_client = QuicEndpoint::new(client_native_config)?;
        let client = Endpoint::new_client(core_config.clone());
        let upstream_transport: Arc<QuicTransport> = QuicTransport::new(Arc::new(client.clone()));

        let conn_id = native_client
            .connect(upstream_addr, &cli.upstream_name, client_tls, &upstream_transport)
            .await?;
        let connection = client.connect(conn_id, upstream_transport)?;

        for (index, spec) in cli.mirrors.iter().enumerate() {
            let (namespace, name) = split_mirror(spec)?;
            let client = client.clone();
            let connection = connection.clone();
            let store = store.clone();
            let namespace = moqt_core::coding::Tuple::from(namespace.split('/').collect::<Vec<_>>());
            tokio::spawn(async move {
                let subscribe_id = SubscribeId(index as u64);
                if let Err(err) = relay::mirror_track(client, connection, store, namespace, name, subscribe_id).await {
                    log::warn!("mirror task failed: {err}");
                }
            });
        }
    }

    loop {
        let Some((conn_id, control_stream)) = listener.accept(&downstream_transport).await else {
            log::warn!("QUIC endpoint stopped accepting connections");
            break;
        };
        if let Err(err) = server.accept(conn_id, downstream_transport.clone(), control_stream) {
            log::warn!("failed to admit connection {conn_id}: {err}");
            downstream_transport.close_connection(conn_id, 0);
        }
    }

    server.engine().shutdown();
    Ok(())
}
