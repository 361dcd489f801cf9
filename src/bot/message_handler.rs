//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::KeyboardRemove;
use tracing::{debug, error, info, warn};

use crate::audit::{append_event, AuditEvent};
use crate::funnel::{
    FunnelReply, EVENT_LOCATION, EVENT_PHONE, EVENT_PING, EVENT_START,
};
use crate::registry::{ChatUser, ClientUpdate, STATUS_NEW};

use super::ui_builder::{
    code_prompt_keyboard, code_prompt_text, contact_keyboard, location_keyboard,
    menu_page_keyboard, redeemed_keyboard, redeemed_text,
};
use super::{chat_user, App};

/// Referral mark recorded when /start carries no payload.
const NO_REFERRAL: &str = "no_ref";

/// Dispatch-boundary wrapper: log failures with context, tell the user to
/// try again, never propagate.
pub async fn message_handler(bot: Bot, msg: Message, app: Arc<App>) -> Result<()> {
    if let Err(e) = handle_message(&bot, &msg, &app).await {
        error!(chat_id = %msg.chat.id, error = ?e, "Message handler failed");
        let _ = bot
            .send_message(msg.chat.id, "⚠️ Something went wrong, please try again.")
            .await;
    }
    Ok(())
}

async fn handle_message(bot: &Bot, msg: &Message, app: &App) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        // Channel posts and the like carry no sender; nothing to do.
        return Ok(());
    };
    let user = chat_user(from);

    if let Some(contact) = msg.contact() {
        handle_contact(bot, msg, app, &user, &contact.phone_number).await
    } else if let Some(location) = msg.location() {
        let mark = format!("{},{}", location.latitude, location.longitude);
        handle_location(bot, msg, app, &user, &mark).await
    } else if let Some(text) = msg.text() {
        handle_text(bot, msg, app, &user, text).await
    } else {
        debug!(user_id = user.id, "Ignoring unsupported message type");
        Ok(())
    }
}

async fn handle_text(bot: &Bot, msg: &Message, app: &App, user: &ChatUser, text: &str) -> Result<()> {
    if let Some(rest) = text.strip_prefix("/start") {
        return handle_start(bot, msg, app, user, rest.trim()).await;
    }

    // Operator command surface; unknown senders get no acknowledgment.
    if matches!(text, "/reload" | "/reconnect" | "/checkstore") {
        if app.config.is_operator(user.id) {
            return handle_operator_command(bot, msg, app, user, text).await;
        }
        warn!(user_id = user.id, command = text, "Operator command from non-operator ignored");
        return Ok(());
    }

    // Free text only means something while a code is pending.
    match app.funnel.submit_code(user, text).await {
        FunnelReply::CodePrompt { offer_name, retry } => {
            bot.send_message(msg.chat.id, code_prompt_text(&offer_name, retry))
                .reply_markup(code_prompt_keyboard())
                .await?;
        }
        FunnelReply::Redeemed { offer_name, link, persist_failed } => {
            if persist_failed {
                warn!(user_id = user.id, "Redemption shown to user but not persisted");
            }
            bot.send_message(msg.chat.id, redeemed_text(&offer_name, &link))
                .reply_markup(redeemed_keyboard())
                .await?;
        }
        FunnelReply::Cancelled(menu) => {
            let sent = bot
                .send_message(msg.chat.id, menu.text.clone())
                .reply_markup(menu_page_keyboard(&menu, true))
                .await?;
            app.sessions.set_menu_message(user.id, Some(sent.id.0));
        }
        FunnelReply::Ignored => {
            bot.send_message(
                msg.chat.id,
                "Use the menu buttons to browse offers, or send /start to begin. 👇",
            )
            .await?;
        }
        other => {
            debug!(user_id = user.id, reply = ?other, "Unexpected funnel reply to text");
        }
    }
    Ok(())
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    app: &App,
    user: &ChatUser,
    payload: &str,
) -> Result<()> {
    let referral = if payload.is_empty() { NO_REFERRAL } else { payload };
    info!(user_id = user.id, referral, "Funnel started");

    let update = ClientUpdate {
        referral: Some(referral.to_string()),
        status: Some(STATUS_NEW.to_string()),
        ..Default::default()
    };
    if let Err(e) = app.registry.upsert(user, update).await {
        error!(user_id = user.id, error = %e, "Client upsert failed on /start");
    }
    app.audit.record(user, EVENT_START, referral);

    bot.send_message(
        msg.chat.id,
        "🔥 Welcome!\n\nShare your phone number to continue:",
    )
    .reply_markup(contact_keyboard())
    .await?;
    Ok(())
}

async fn handle_contact(
    bot: &Bot,
    msg: &Message,
    app: &App,
    user: &ChatUser,
    phone: &str,
) -> Result<()> {
    if let Err(e) = app.registry.upsert(user, ClientUpdate::phone(phone)).await {
        error!(user_id = user.id, error = %e, "Client upsert failed on contact");
    }
    app.audit.record(user, EVENT_PHONE, phone);

    bot.send_message(msg.chat.id, "✅ Thanks! Now share your location:")
        .reply_markup(location_keyboard())
        .await?;
    Ok(())
}

async fn handle_location(
    bot: &Bot,
    msg: &Message,
    app: &App,
    user: &ChatUser,
    mark: &str,
) -> Result<()> {
    if let Err(e) = app.registry.upsert(user, ClientUpdate::location(mark)).await {
        error!(user_id = user.id, error = %e, "Client upsert failed on location");
    }
    app.audit.record(user, EVENT_LOCATION, mark);

    bot.send_message(msg.chat.id, "✅ Great, you're all set!")
        .reply_markup(KeyboardRemove::new())
        .await?;

    // Registration complete: open the category menu
    if let FunnelReply::Categories(menu) = app.funnel.open_categories(user) {
        let sent = bot
            .send_message(msg.chat.id, menu.text.clone())
            .reply_markup(menu_page_keyboard(&menu, false))
            .await?;
        app.sessions.set_menu_message(user.id, Some(sent.id.0));
    }
    Ok(())
}

async fn handle_operator_command(
    bot: &Bot,
    msg: &Message,
    app: &App,
    user: &ChatUser,
    command: &str,
) -> Result<()> {
    info!(user_id = user.id, command, "Operator command");
    match command {
        "/reload" => match app.catalog.reload().await {
            Ok(snapshot) => {
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "✅ Catalog reloaded: {} offers in {} categories.",
                        snapshot.len(),
                        snapshot.categories().len()
                    ),
                )
                .await?;
            }
            Err(e) => {
                error!(error = %e, "Catalog reload failed");
                bot.send_message(msg.chat.id, format!("❌ Reload failed: {e}"))
                    .await?;
            }
        },
        "/reconnect" => {
            // Re-arm long polling, dropping anything queued on the transport.
            match bot.delete_webhook().drop_pending_updates(true).await {
                Ok(_) => {
                    bot.send_message(msg.chat.id, "✅ Event stream reset, pending updates dropped.")
                        .await?;
                }
                Err(e) => {
                    error!(error = %e, "Event stream reset failed");
                    bot.send_message(msg.chat.id, format!("❌ Reset failed: {e}"))
                        .await?;
                }
            }
        }
        "/checkstore" => {
            // One direct audit write, bypassing the queue, to prove the
            // store is reachable end to end.
            let probe = AuditEvent::new(user, EVENT_PING, "store connectivity check");
            match append_event(app.store.as_ref(), &app.config.event_log_sheet, probe).await {
                Ok(()) => {
                    bot.send_message(msg.chat.id, "✅ Store reachable, audit row written.")
                        .await?;
                }
                Err(e) => {
                    error!(error = %e, "Store connectivity probe failed");
                    bot.send_message(msg.chat.id, format!("❌ Store probe failed: {e}"))
                        .await?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}
