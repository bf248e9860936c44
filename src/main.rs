use std::sync::Arc;

use serenity::all::{ClientBuilder, GatewayIntents, Http};
use tracing::{error, info};
use wirebot::{
    BOT_NAME, Data, Error, StateStore,
    config::BotConfig,
    handlers::Handler,
    logging,
    mute::RoleNameResolver,
    platform::SerenityPlatform,
};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // A missing .env file is fine; the variables may come from the environment
    dotenvy::dotenv().ok();
    let config = BotConfig::from_env()?;

    logging::init(&config.log_dir)?;
    info!("Starting {BOT_NAME} with {config:?}");

    let http = Arc::new(Http::new(&config.token));
    let store = StateStore::load(&config.state_file).await?;
    let data = Data::new(
        store,
        Arc::new(SerenityPlatform::new(Arc::clone(&http))),
        Arc::new(RoleNameResolver::new(&config.mute_roles)),
        config.prefix.clone(),
        config.tick,
    );

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = ClientBuilder::new(&config.token, intents)
        .event_handler(Handler::new(data.clone()))
        .await?;

    // Stop background jobs before the gateway connection goes away
    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_data = data.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        logging::log_console("Shutting down");
        shutdown_data.scheduler.stop().await;
        shard_manager.shutdown_all().await;
    });

    info!("Connecting to Discord...");
    client.start().await?;

    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
