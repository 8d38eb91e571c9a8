use turnstile::config::Config;
use turnstile::gateway::HelloWorld;
use turnstile::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let server = Server::bind(&cfg, HelloWorld)?;
    let shutdown = server.shutdown_handle();

    // The reactor blocks its thread; keep it off the async workers.
    let mut reactor = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        res = &mut reactor => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.shutdown();
            reactor.await??;
        }
    }

    Ok(())
}
