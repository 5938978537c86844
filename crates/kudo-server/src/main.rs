mod processor;

use std::net::SocketAddr;
use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kudo_api::AppState;
use kudo_bot::BotContext;
use kudo_client::{LikeApiClient, ShortenerClient};
use kudo_db::Database;
use kudo_types::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kudo=debug,tower_http=debug".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    if config.admins.is_empty() {
        info!("No admin ids configured; /addvip will be unusable");
    }

    let db = Arc::new(Database::open(&config.db_path)?);

    let like = Arc::new(LikeApiClient::new(config.like_api_url.clone())?);
    let shortener = Arc::new(ShortenerClient::new(
        config.shortener_url.clone(),
        config.shortener_api_key.clone(),
    )?);

    let bot = Bot::new(&config.bot_token);

    // One token fans shutdown out to the verify server and the processor.
    let shutdown = CancellationToken::new();

    // Verification endpoint
    let app = kudo_api::router(AppState {
        db: db.clone(),
        config: config.clone(),
    });
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Verification endpoint listening on {}", addr);

    let http_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            error!("Verification server error: {}", e);
        }
    });

    // Background job processor
    tokio::spawn(processor::run_processor_loop(
        db.clone(),
        config.clone(),
        like.clone(),
        bot.clone(),
        shutdown.clone(),
    ));

    // Command dispatcher
    let ctx = BotContext {
        config,
        db,
        like,
        shortener,
    };

    let handler = Update::filter_message().branch(
        dptree::filter(|msg: Message| msg.text().is_some())
            .endpoint(kudo_bot::handle_text_message),
    );

    info!("Starting command dispatcher");
    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build();

    // SIGTERM lands here; ctrl-c is additionally handled by the dispatcher
    // itself. Either way the token stops the HTTP server and the processor.
    let dispatcher_shutdown = dispatcher.shutdown_token();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.cancel();
        if let Ok(stopped) = dispatcher_shutdown.shutdown() {
            stopped.await;
        }
    });

    dispatcher.dispatch().await;

    shutdown.cancel();
    info!("Dispatcher stopped, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
