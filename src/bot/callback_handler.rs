//! Callback Handler module for processing inline keyboard callback queries

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, MaybeInaccessibleMessage};
use tracing::{debug, error};

use crate::funnel::FunnelReply;
use crate::menu::MenuPage;
use crate::registry::ChatUser;

use super::ui_builder::{
    code_prompt_keyboard, code_prompt_text, menu_page_keyboard, redeemed_keyboard, redeemed_text,
    CATEGORY_TOKEN_PREFIX, OFFER_TOKEN_PREFIX, TOKEN_BACK_CATEGORIES, TOKEN_BACK_OFFERS,
    TOKEN_CANCEL_CODE, TOKEN_PAGE_NEXT, TOKEN_PAGE_PREV,
};
use super::{chat_user, App};

/// Dispatch-boundary wrapper; mirrors the message handler's isolation.
pub async fn callback_handler(bot: Bot, q: CallbackQuery, app: Arc<App>) -> Result<()> {
    if let Err(e) = handle_callback(&bot, &q, &app).await {
        error!(user_id = %q.from.id, error = ?e, "Callback handler failed");
        let _ = bot
            .answer_callback_query(q.id.clone())
            .text("⚠️ Something went wrong, please try again.")
            .await;
        return Ok(());
    }
    Ok(())
}

async fn handle_callback(bot: &Bot, q: &CallbackQuery, app: &App) -> Result<()> {
    let user = chat_user(&q.from);
    let data = q.data.as_deref().unwrap_or("");
    debug!(user_id = user.id, data, "Callback query");

    let reply = if let Some(category) = data.strip_prefix(CATEGORY_TOKEN_PREFIX) {
        app.funnel.select_category(&user, category).await
    } else if let Some(offer_id) = data.strip_prefix(OFFER_TOKEN_PREFIX) {
        app.funnel.select_offer(&user, offer_id).await
    } else {
        match data {
            TOKEN_PAGE_NEXT => app.funnel.turn_page(&user, true).await,
            TOKEN_PAGE_PREV => app.funnel.turn_page(&user, false).await,
            TOKEN_BACK_CATEGORIES => app.funnel.back_to_categories(&user),
            TOKEN_BACK_OFFERS => app.funnel.refresh_offer_page(&user).await,
            TOKEN_CANCEL_CODE => app.funnel.cancel_code(&user).await,
            _ => FunnelReply::Ignored,
        }
    };

    // Short notices ride on the callback answer itself; everything else
    // answers plainly to clear the loading state.
    let mut answer = bot.answer_callback_query(q.id.clone());
    match reply {
        FunnelReply::Categories(menu) => {
            show_menu(bot, q, app, &user, &menu, false).await?;
        }
        FunnelReply::OfferPage(menu) | FunnelReply::Cancelled(menu) => {
            show_menu(bot, q, app, &user, &menu, true).await?;
        }
        FunnelReply::CodePrompt { offer_name, retry } => {
            if let Some(chat_id) = callback_chat(q) {
                bot.send_message(chat_id, code_prompt_text(&offer_name, retry))
                    .reply_markup(code_prompt_keyboard())
                    .await?;
            }
        }
        FunnelReply::Redeemed { offer_name, link, persist_failed } => {
            if persist_failed {
                error!(user_id = user.id, "Redemption shown to user but not persisted");
            }
            if let Some(chat_id) = callback_chat(q) {
                bot.send_message(chat_id, redeemed_text(&offer_name, &link))
                    .reply_markup(redeemed_keyboard())
                    .await?;
            }
        }
        FunnelReply::AlreadyTaken => {
            answer = answer.text("You already took this offer 👌");
        }
        FunnelReply::OfferMissing => {
            answer = answer.text("This offer is no longer available.");
        }
        FunnelReply::Ignored => {}
    }
    answer.await?;
    Ok(())
}

fn callback_chat(q: &CallbackQuery) -> Option<ChatId> {
    q.message.as_ref().map(|m| m.chat().id)
}

/// Edit the menu message the tap came from; fall back to a fresh message
/// when the original is inaccessible or the edit fails (e.g. unchanged
/// content after a double tap).
async fn show_menu(
    bot: &Bot,
    q: &CallbackQuery,
    app: &App,
    user: &ChatUser,
    menu: &MenuPage,
    with_back: bool,
) -> Result<()> {
    let keyboard: InlineKeyboardMarkup = menu_page_keyboard(menu, with_back);

    if let Some(MaybeInaccessibleMessage::Regular(msg)) = q.message.as_ref() {
        let edited = bot
            .edit_message_text(msg.chat.id, msg.id, menu.text.clone())
            .reply_markup(keyboard.clone())
            .await;
        match edited {
            Ok(_) => {
                app.sessions.set_menu_message(user.id, Some(msg.id.0));
                return Ok(());
            }
            Err(e) => {
                debug!(user_id = user.id, error = %e, "Menu edit failed, sending fresh message");
            }
        }
    }

    if let Some(chat_id) = callback_chat(q) {
        let sent = bot
            .send_message(chat_id, menu.text.clone())
            .reply_markup(keyboard)
            .await?;
        app.sessions.set_menu_message(user.id, Some(sent.id.0));
    }
    Ok(())
}
