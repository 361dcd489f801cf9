//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::menu::MenuPage;

// Callback tokens shared by the keyboards and the callback handler
pub const TOKEN_PAGE_PREV: &str = "page_prev";
pub const TOKEN_PAGE_NEXT: &str = "page_next";
pub const TOKEN_BACK_CATEGORIES: &str = "back_cats";
pub const TOKEN_BACK_OFFERS: &str = "back_offers";
pub const TOKEN_CANCEL_CODE: &str = "cancel_code";
pub const CATEGORY_TOKEN_PREFIX: &str = "cat_";
pub const OFFER_TOKEN_PREFIX: &str = "offer_";

/// Reply keyboard asking for the user's phone number.
pub fn contact_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("📱 Share phone number").request(ButtonRequest::Contact),
    ]])
    .resize_keyboard()
}

/// Reply keyboard asking for the user's location.
pub fn location_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("📍 Share location").request(ButtonRequest::Location),
    ]])
    .resize_keyboard()
}

/// Inline keyboard for a rendered menu page.
///
/// One row per choice, paging controls only when applicable, and a back
/// control on every offer page.
pub fn menu_page_keyboard(page: &MenuPage, with_back: bool) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .choices
        .iter()
        .map(|choice| {
            vec![InlineKeyboardButton::callback(
                choice.label.clone(),
                choice.token.clone(),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.has_prev {
        nav.push(InlineKeyboardButton::callback("⬅️ Prev", TOKEN_PAGE_PREV));
    }
    if page.has_next {
        nav.push(InlineKeyboardButton::callback("Next ➡️", TOKEN_PAGE_NEXT));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    if with_back {
        rows.push(vec![InlineKeyboardButton::callback(
            "🔙 Back to categories",
            TOKEN_BACK_CATEGORIES,
        )]);
    }

    InlineKeyboardMarkup::new(rows)
}

/// Inline keyboard shown with a code prompt.
pub fn code_prompt_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "❌ Cancel",
        TOKEN_CANCEL_CODE,
    )]])
}

/// Navigation offered under a redemption confirmation.
pub fn redeemed_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📂 More offers", TOKEN_BACK_OFFERS),
        InlineKeyboardButton::callback("🔙 Categories", TOKEN_BACK_CATEGORIES),
    ]])
}

/// Text for a code prompt, fresh or after a mismatch.
pub fn code_prompt_text(offer_name: &str, retry: bool) -> String {
    if retry {
        format!("❌ Incorrect code.\n\nTry again for \"{offer_name}\", or tap Cancel.")
    } else {
        format!(
            "🔐 \"{offer_name}\" is locked behind a secret code.\n\nSend the code as a message, or tap Cancel."
        )
    }
}

/// Confirmation text revealing the offer link.
pub fn redeemed_text(offer_name: &str, link: &str) -> String {
    format!("🎉 Code accepted!\n\nHere is your link for \"{offer_name}\":\n{link}")
}
