use algos_core::algorithm::AlgorithmRegistry;
use algos_core::{config, ledger, logging, Scheduler, SchedulerLimits};
use algos_rest::{retention_sweep, router, AppState};
use anyhow::Context;

#[tokio::main]
async fn main() {
    if logging::init_logging("algos-rest").is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = serve().await {
        eprintln!("algos-rest error: {:#}", err);
        std::process::exit(1);
    }
}

async fn serve() -> anyhow::Result<()> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);

    let ledger = ledger::open_ledger(&cfg).await?;
    let scheduler = Scheduler::new(
        ledger,
        AlgorithmRegistry::with_builtins(),
        SchedulerLimits::from_config(&cfg),
    );
    if cfg.server.recover_on_start {
        scheduler.recover().await?;
    }

    let sweeper = cfg.retention().map(|retention| {
        let every = cfg.poll_interval().max(retention / 4);
        tokio::spawn(retention_sweep(scheduler.clone(), retention, every))
    });

    let listener = tokio::net::TcpListener::bind(cfg.server.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.server.listen_addr))?;
    tracing::info!("algos-rest listening on {}", cfg.server.listen_addr);

    axum::serve(listener, router(AppState::new(scheduler)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("algos-rest stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
