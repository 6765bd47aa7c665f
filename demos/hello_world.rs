use std::sync::Arc;

use weir::{EngineConfig, FnRequestFilter, Pipeline, Response, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut pipeline = Pipeline::new();
    pipeline.add_upstream(FnRequestFilter::new(|_req| {
        Some(Response::ok("hello world!"))
    }));
    // Per-stage timing breakdown for every completed request.
    pipeline.on_done(FnRequestFilter::new(|req| {
        req.trace();
        None
    }));

    let cfg = EngineConfig::load();
    tracing::info!("listening on {}", cfg.listen_addr);
    let server = Arc::new(Server::from_config(cfg, pipeline));

    let mut serve = {
        let server = server.clone();
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    tokio::select! {
        res = &mut serve => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining");
            server.stop_accepting();
            serve.await??;
        }
    }

    Ok(())
}
