//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed consensus metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{self, Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Consensus-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated from the
/// admission loop, the producer and the transaction pool.
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// Blocks produced by this node.
    pub generated_block_count: IntCounter,
    /// Blocks received over the transport.
    pub received_block_count: IntCounter,
    /// Blocks rejected by the admission path, labeled by error kind.
    pub rejected_block_count: IntCounterVec,
    /// Height of the finalized (irreversible) chain.
    pub confirmed_blockchain_length: IntGauge,
    /// Number of pending transactions in the pool.
    pub txpool_size: IntGauge,
}

impl ConsensusMetrics {
    /// Registers consensus metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let generated_block_count = IntCounter::with_opts(Opts::new(
            "generated_block_count",
            "Count of blocks generated by this node",
        ))?;
        registry.register(Box::new(generated_block_count.clone()))?;

        let received_block_count = IntCounter::with_opts(Opts::new(
            "received_block_count",
            "Count of blocks received by this node",
        ))?;
        registry.register(Box::new(received_block_count.clone()))?;

        let rejected_block_count = IntCounterVec::new(
            Opts::new(
                "rejected_block_count",
                "Count of blocks rejected by the admission path",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_block_count.clone()))?;

        let confirmed_blockchain_length = IntGauge::with_opts(Opts::new(
            "confirmed_blockchain_length",
            "Length of the confirmed blockchain on this node",
        ))?;
        registry.register(Box::new(confirmed_blockchain_length.clone()))?;

        let txpool_size = IntGauge::with_opts(Opts::new(
            "txpool_size",
            "Number of pending transactions in the pool",
        ))?;
        registry.register(Box::new(txpool_size.clone()))?;

        Ok(Self {
            generated_block_count,
            received_block_count,
            rejected_block_count,
            confirmed_blockchain_length,
            txpool_size,
        })
    }
}

/// Wrapper around a Prometheus registry and the consensus metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub consensus: ConsensusMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the consensus metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chain".to_string()), None)?;
        let consensus = ConsensusMetrics::register(&registry)?;
        Ok(Self {
            registry,
            consensus,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}
