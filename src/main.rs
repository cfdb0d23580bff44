//! Trackside - Pari-Mutuel Wagering Backend
//!
//! Run modes:
//!   trackside              - Run API server + deposit watcher
//!   trackside serve        - Same as above
//!   trackside watch        - Run the deposit watcher only
//!   trackside help         - Show usage

use std::env;
use std::sync::Arc;

use dotenv::dotenv;
use trackside::events::engine_event_channel;
use trackside::ledger::LedgerGateway;
use trackside::logging;
use trackside::reconciler::ReconcilerConfig;
use trackside::storage::{SqliteStore, WagerStore};
use trackside::{
    api, DepositReconciler, EngineConfig, KeyStore, RpcLedgerGateway, WagerEngine,
};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("serve");

    match mode {
        "serve" => run(true).await,
        "watch" => run(false).await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("Trackside - Pari-Mutuel Wagering Backend");
    println!();
    println!("Usage:");
    println!("  trackside serve    Run API server + deposit watcher (default)");
    println!("  trackside watch    Run the deposit watcher only");
    println!("  trackside help     Show this message");
    println!();
    println!("Configuration is read from TRACKSIDE_* environment variables;");
    println!("see the module docs in src/config.rs for the full surface.");
}

async fn run(with_api: bool) {
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(config.log_level.as_str().into(), config.log_json) {
        eprintln!("logging error: {}", e);
        std::process::exit(1);
    }

    // Announces unencrypted keystore mode loudly, among other things
    config.log_summary();

    let store = match SqliteStore::new(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, db_path = %config.db_path, "failed to open database");
            std::process::exit(1);
        }
    };
    let store: Arc<dyn WagerStore> = Arc::new(store);

    let ledger: Arc<dyn LedgerGateway> = Arc::new(RpcLedgerGateway::new(&config.rpc_url));
    let keystore = Arc::new(KeyStore::new(config.keystore_passphrase.clone()));
    let (events, _events_rx) = engine_event_channel();

    let engine = match WagerEngine::new(
        config.clone(),
        store.clone(),
        ledger.clone(),
        keystore,
        events.clone(),
    ) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "failed to build engine");
            std::process::exit(1);
        }
    };

    tracing::info!(treasury = %engine.treasury_address(), "engine ready");

    let reconciler = Arc::new(DepositReconciler::new(
        ReconcilerConfig::from_engine(&config),
        store,
        ledger,
        events,
    ));

    if let Err(e) = reconciler.preload_signatures().await {
        tracing::error!(error = %e, "failed to preload processed signatures");
        std::process::exit(1);
    }

    let watcher = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run().await })
    };

    if with_api {
        tokio::select! {
            result = api::start_server(engine, config.api_port) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "API server error");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }
    } else {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    }

    // Let the in-flight reconcile cycle finish before exiting
    reconciler.stop().await;
    let _ = watcher.await;
}
