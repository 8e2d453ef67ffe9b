use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use teloxide::prelude::*;

use reelbot::cli::{Cli, Commands};
use reelbot::scheduler::spawn_scheduler;
use reelbot::services::Services;
use reelbot::telegram::dialogue::DialogStore;
use reelbot::telegram::notifications::notify_owner_startup;
use reelbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};
use reelcore::core::metrics;
use reelcore::core::retry::{retry, RetryConfig};
use reelcore::prompt::{PromptGenerator, PromptKind};
use reelcore::schedule::WeeklySchedule;
use reelcore::storage::users::ensure_admins;
use reelcore::upload::{watch_url, VideoUploader};
use reelcore::{config, create_pool, get_connection};

/// Main entry point for the bot
///
/// Parses CLI arguments and dispatches to the selected subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Log panics from dispatcher tasks instead of losing them on stderr
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // .env must be loaded before the first config static is touched
    let _ = dotenv();

    reelcore::core::init_logger(&config::LOG_FILE_PATH, &config::LOG_LEVEL)?;

    match cli.command {
        None | Some(Commands::Run) => run_bot().await,
        Some(Commands::Generate { upload }) => run_cli_generate(upload).await,
        Some(Commands::Prompt) => run_cli_prompt().await,
    }
}

async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");
    let init_start = std::time::Instant::now();

    metrics::init_metrics();

    let bot = create_bot()?;

    // The Bot API (or a local Bot API server) may still be starting
    let me = retry(&RetryConfig::startup(), || async { bot.get_me().await })
        .await
        .into_result()
        .context("Bot API is not reachable")?;
    log::info!("Bot username: @{}", me.username());

    let db_pool = create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?;
    {
        let conn = get_connection(&db_pool).map_err(|e| anyhow::anyhow!("Failed to get connection: {}", e))?;
        let granted = ensure_admins(&conn, &config::ADMIN_IDS)?;
        if granted > 0 {
            log::info!("Granted admin rights to {} configured user(s)", granted);
        }
    }

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let services = Arc::new(Services::from_env().await?);
    let dialogs = Arc::new(DialogStore::new());
    let deps = HandlerDeps::new(Arc::new(db_pool), services.clone(), dialogs.clone());

    notify_owner_startup(&bot, config::owner_chat_id()).await;

    let scheduler = match config::owner_chat_id() {
        Some(owner) if *config::schedule::ENABLED => Some(spawn_scheduler(
            WeeklySchedule::from_env(),
            bot.clone(),
            services.video_job.clone(),
            dialogs,
            owner,
            *config::schedule::AUTO_UPLOAD,
        )),
        Some(_) => {
            log::info!("Weekly schedule is disabled");
            None
        }
        None => {
            log::warn!("No admin chat configured, weekly schedule will not run");
            None
        }
    };

    log::info!("🎉 Bot initialization complete in {:.2}s", init_start.elapsed().as_secs_f64());

    {
        use teloxide::update_listeners::Polling;

        let listener = Polling::builder(bot.clone()).drop_pending_updates().build();

        Dispatcher::builder(bot, schema(deps))
            .dependencies(DependencyMap::new())
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    }

    log::info!("Dispatcher shutdown gracefully");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    services.shutdown();
    Ok(())
}

/// One generation cycle from the command line, no Telegram involved.
async fn run_cli_generate(upload: bool) -> Result<()> {
    let services = Services::from_env().await?;
    let pipeline = services
        .video_job
        .pipeline()
        .cloned()
        .context("video pipeline is not configured (GigaChat and SaluteSpeech credentials are required)")?;

    let result = pipeline.generate_video().await;
    let video = match result {
        Ok(video) => video,
        Err(e) => {
            services.shutdown();
            return Err(e.into());
        }
    };

    println!("Title: {}", video.title);
    println!("Video: {}", video.video.display());
    println!("Audio: {}", video.audio.display());
    for image in &video.images {
        println!("Image: {}", image.display());
    }

    if upload {
        let pending = video.pending_upload();
        match services.youtube.upload(&pending.video, &pending.metadata).await {
            Ok(id) => println!("Uploaded: {}", watch_url(&id)),
            Err(e) => {
                services.shutdown();
                return Err(anyhow::anyhow!("Upload failed: {}", e));
            }
        }
    }

    services.shutdown();
    Ok(())
}

async fn run_cli_prompt() -> Result<()> {
    let services = Services::from_env().await?;
    let kind = config::PROMPT_TYPE
        .parse::<PromptKind>()
        .map_err(|_| anyhow::anyhow!("Unknown PROMPT_TYPE: {}", config::PROMPT_TYPE.as_str()))?;

    let prompt = PromptGenerator::new(kind, services.chat.clone()).generate().await;
    println!("{}", prompt);

    services.shutdown();
    Ok(())
}
