//! Menu renderer
//!
//! Pure mapping from an ordered offer list and a requested page to the text
//! and controls of one menu page. No I/O, fully deterministic.

use crate::catalog::Offer;

/// One tappable choice on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuChoice {
    pub label: String,
    /// Opaque selection token handed back by the transport
    pub token: String,
}

/// A rendered menu page plus its navigation controls.
///
/// A "back" control is always present at the transport layer; only the
/// paging controls depend on the page position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuPage {
    pub text: String,
    pub choices: Vec<MenuChoice>,
    pub page: usize,
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Render one page of a category's offers.
///
/// `page` is clamped into `[1, total_pages]`. An empty offer list renders an
/// empty-state message with no choices and no paging controls.
pub fn render_offer_page(
    offers: &[Offer],
    category: &str,
    page: usize,
    page_size: usize,
) -> MenuPage {
    if offers.is_empty() {
        return MenuPage {
            text: format!("😔 No offers left in \"{category}\" right now. Check back later!"),
            choices: Vec::new(),
            page: 1,
            total_pages: 0,
            has_prev: false,
            has_next: false,
        };
    }

    let page_size = page_size.max(1);
    let total_pages = offers.len().div_ceil(page_size);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(offers.len());

    let choices = offers[start..end]
        .iter()
        .map(|offer| MenuChoice {
            label: format!("🎁 {}", offer.name),
            token: format!("offer_{}", offer.id),
        })
        .collect();

    MenuPage {
        text: format!("📂 {category} — page {page}/{total_pages}\n\nPick an offer:"),
        choices,
        page,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    }
}

/// Render the category list menu.
pub fn render_categories(categories: &[String]) -> MenuPage {
    if categories.is_empty() {
        return MenuPage {
            text: "😔 No offers available right now. Check back later!".to_string(),
            choices: Vec::new(),
            page: 1,
            total_pages: 0,
            has_prev: false,
            has_next: false,
        };
    }

    let choices = categories
        .iter()
        .map(|name| MenuChoice {
            label: format!("💼 {name}"),
            token: format!("cat_{name}"),
        })
        .collect();

    MenuPage {
        text: "Pick an offer category 👇".to_string(),
        choices,
        page: 1,
        total_pages: 1,
        has_prev: false,
        has_next: false,
    }
}
