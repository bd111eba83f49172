// src/main.rs
//
// Minimal demo node that wires up the chain library:
//
// - a single-witness devnet (the local account is the whole schedule)
// - in-memory state store + built-in token engine
// - RocksDB-backed finalized block store
// - loopback transport (no real peers)
// - Prometheus metrics exporter on /metrics
// - PoB service: admission loop, slot-scheduled producer, pool sweeps.

use std::sync::Arc;

use chain::{
    Account, BlockStore, ChainConfig, LoopbackNet, MemStateStore, MetricsRegistry, Pob,
    RocksDbBlockStore, StateStore, TransferEngine, TxPool, build_genesis,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run_node().await {
        tracing::error!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let mut cfg = ChainConfig::default();

    // Devnet identity: a fixed key so restarts keep the same witness id.
    let account =
        Account::new(Some(vec![42u8; 32])).map_err(|e| format!("failed to create account: {e}"))?;
    tracing::info!(witness = %account.id, "node identity");
    cfg.consensus.witness_list = vec![account.id.clone()];
    cfg.genesis.witness_list = vec![account.id.clone()];
    cfg.genesis
        .initial_balances
        .push((account.id.clone(), 1_000_000_000));

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::warn!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Storage + state + genesis
    // ---------------------------

    let chain_store = Arc::new(
        RocksDbBlockStore::open(&cfg.storage)
            .map_err(|e| format!("failed to open RocksDB store at {}: {e:?}", cfg.storage.path))?,
    );

    let mut state = MemStateStore::new();
    let genesis =
        build_genesis(&cfg.genesis, &mut state).map_err(|e| format!("genesis failed: {e}"))?;

    // Fresh store: start from genesis. A prior chain would need state
    // replay, which the in-memory state store cannot provide, so the
    // demo always restarts the devnet from block zero.
    let root_block = if chain_store.length() == 0 {
        genesis
    } else {
        return Err(format!(
            "existing chain at {} has {} blocks; remove it to restart the devnet",
            cfg.storage.path,
            chain_store.length()
        ));
    };

    // ---------------------------
    // Transport + pool + service
    // ---------------------------

    let net = Arc::new(LoopbackNet::new());
    let mut pool = TxPool::new(cfg.txpool.clone());
    pool.set_net(net.clone());
    pool.set_metrics(metrics.clone());
    let pool = Arc::new(pool);

    let pob = Pob::new(
        account,
        cfg.consensus.clone(),
        root_block,
        Box::new(state) as Box<dyn StateStore>,
        chain_store.clone() as Arc<dyn BlockStore>,
        pool,
        Arc::new(TransferEngine::new()),
        net,
        metrics,
    );

    tracing::info!(
        slot_length = ?cfg.consensus.slot_length,
        "starting single-witness devnet"
    );
    let handle = pob.run();

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
    tracing::info!("shutting down");
    handle.stop().await;
    Ok(())
}
