use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use offerbot::audit::AuditLog;
use offerbot::bot::{callback_handler, message_handler, App};
use offerbot::catalog::OfferCatalog;
use offerbot::config::BotConfig;
use offerbot::funnel::Funnel;
use offerbot::health;
use offerbot::registry::ClientRegistry;
use offerbot::session::SessionStore;
use offerbot::store::{SheetStore, SheetsClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting offer funnel bot");

    let config = BotConfig::from_env()?;

    let store: Arc<dyn SheetStore> = Arc::new(SheetsClient::new(
        config.sheets_api_base.clone(),
        &config.spreadsheet_id,
        config.sheets_token.clone(),
        config.retry.clone(),
    )?);

    let catalog = Arc::new(OfferCatalog::new(
        Arc::clone(&store),
        config.offers_sheet.clone(),
    ));
    let registry = Arc::new(ClientRegistry::new(
        Arc::clone(&store),
        config.clients_sheet.clone(),
    ));
    let sessions = Arc::new(SessionStore::new());
    let audit = AuditLog::spawn(Arc::clone(&store), config.event_log_sheet.clone());

    // First catalog load; a failure here is survivable, the operator can
    // /reload once the store is back.
    if let Err(e) = catalog.reload().await {
        error!(error = %e, "Initial catalog load failed, starting with an empty catalog");
    }

    let funnel = Funnel::new(
        Arc::clone(&catalog),
        Arc::clone(&registry),
        Arc::clone(&sessions),
        audit.clone(),
        config.page_size,
    );

    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port).await {
            error!(error = %e, "Liveness endpoint terminated");
        }
    });

    let bot = Bot::new(config.bot_token.clone());
    let app = Arc::new(App {
        config,
        store,
        catalog,
        registry,
        sessions,
        audit,
        funnel,
    });

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let app = Arc::clone(&app);
            move |bot: Bot, msg: Message| {
                let app = Arc::clone(&app);
                async move { message_handler(bot, msg, app).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let app = Arc::clone(&app);
            move |bot: Bot, q: CallbackQuery| {
                let app = Arc::clone(&app);
                async move { callback_handler(bot, q, app).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
