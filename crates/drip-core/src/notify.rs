//! Pure composition of the new-drop push notification.
//!
//! The composer receives new items in encounter order (roasters in configured
//! order, items in adapter-yield order) and produces a title plus body lines.
//! The multi-roaster view groups by roaster sorted lexicographically for
//! display, but `primary_id` always belongs to the first item encountered.

use std::collections::BTreeMap;

use crate::Product;

/// Body lines are capped at this many before a `+{K} more…` marker.
pub const MAX_BODY_LINES: usize = 8;

/// Titles shown per roaster in the multi-roaster view.
const TITLES_PER_ROASTER: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body_lines: Vec<String>,
    /// Identifier of the first new item in encounter order.
    pub primary_id: String,
    /// Identifiers of every new item, encounter order.
    pub all_ids: Vec<String>,
}

/// Build the notification for a run's new items. Returns `None` when the
/// list is empty (callers skip delivery entirely in that case).
pub fn compose(new_items: &[(Product, String)]) -> Option<Notification> {
    let (first_product, first_id) = new_items.first()?;
    let all_ids: Vec<String> = new_items.iter().map(|(_, id)| id.clone()).collect();
    let n = new_items.len();

    if n == 1 {
        let price = if first_product.price_text.is_empty() {
            "New coffee!".to_string()
        } else {
            first_product.price_text.clone()
        };
        return Some(Notification {
            title: format!("New from {}: {}", first_product.roaster, first_product.title),
            body_lines: vec![price, first_product.url.clone()],
            primary_id: first_id.clone(),
            all_ids,
        });
    }

    // Roaster-sorted grouping is a separate view from the encounter-ordered
    // list; BTreeMap gives the lexicographic roaster order for display while
    // preserving item order within each roaster.
    let mut by_roaster: BTreeMap<&str, Vec<&Product>> = BTreeMap::new();
    for (product, _) in new_items {
        by_roaster.entry(product.roaster.as_str()).or_default().push(product);
    }

    if by_roaster.len() == 1 {
        let roaster = first_product.roaster.as_str();
        let lines = new_items
            .iter()
            .map(|(p, _)| {
                if p.price_text.is_empty() {
                    format!("• {}", p.title)
                } else {
                    format!("• {} — {}", p.title, p.price_text)
                }
            })
            .collect();
        return Some(Notification {
            title: format!("{n} new items from {roaster}"),
            body_lines: truncate_lines(lines),
            primary_id: first_id.clone(),
            all_ids,
        });
    }

    let mut lines = Vec::new();
    for (roaster, items) in &by_roaster {
        let shown = items
            .iter()
            .take(TITLES_PER_ROASTER)
            .map(|p| p.title.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let extras = items.len().saturating_sub(TITLES_PER_ROASTER);
        if extras > 0 {
            lines.push(format!("• {roaster}: {shown}; +{extras} more"));
        } else {
            lines.push(format!("• {roaster}: {shown}"));
        }
    }
    Some(Notification {
        title: format!("New drops: {n} items from {} sources", by_roaster.len()),
        body_lines: truncate_lines(lines),
        primary_id: first_id.clone(),
        all_ids,
    })
}

fn truncate_lines(lines: Vec<String>) -> Vec<String> {
    if lines.len() <= MAX_BODY_LINES {
        return lines;
    }
    let hidden = lines.len() - MAX_BODY_LINES;
    let mut out: Vec<String> = lines.into_iter().take(MAX_BODY_LINES).collect();
    out.push(format!("+{hidden} more…"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::product_id;

    fn item(roaster: &str, title: &str, price: &str) -> (Product, String) {
        let url = format!(
            "https://example.com/{}/products/{}",
            roaster.to_ascii_lowercase(),
            title.to_ascii_lowercase().replace(' ', "-")
        );
        let mut p = Product::new(roaster, title, url.clone());
        p.price_text = price.to_string();
        (p, product_id(&url))
    }

    #[test]
    fn empty_input_composes_nothing() {
        assert!(compose(&[]).is_none());
    }

    #[test]
    fn single_item_shows_price_and_url() {
        let items = vec![item("Acme", "Dark Roast", "$16.00")];
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.title, "New from Acme: Dark Roast");
        assert_eq!(
            msg.body_lines,
            vec![
                "$16.00".to_string(),
                "https://example.com/acme/products/dark-roast".to_string()
            ]
        );
        assert_eq!(msg.primary_id, items[0].1);
    }

    #[test]
    fn single_item_without_price_gets_placeholder() {
        let items = vec![item("Acme", "Dark Roast", "")];
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.body_lines[0], "New coffee!");
    }

    #[test]
    fn single_roaster_lists_every_item() {
        let items = vec![
            item("Acme", "One", "$15.00"),
            item("Acme", "Two", ""),
            item("Acme", "Three", "$19.00"),
        ];
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.title, "3 new items from Acme");
        assert_eq!(
            msg.body_lines,
            vec![
                "• One — $15.00".to_string(),
                "• Two".to_string(),
                "• Three — $19.00".to_string(),
            ]
        );
    }

    #[test]
    fn single_roaster_truncates_past_eight_lines() {
        let items: Vec<_> = (0..10)
            .map(|i| item("Acme", &format!("Coffee {i}"), "$18.00"))
            .collect();
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.body_lines.len(), MAX_BODY_LINES + 1);
        assert_eq!(msg.body_lines.last().map(String::as_str), Some("+2 more…"));
    }

    #[test]
    fn multi_roaster_sorts_lexicographically_but_keeps_encounter_primary() {
        // Zed is encountered first; display still puts Acme before Zed.
        let items = vec![
            item("Zed", "Zephyr", "$20.00"),
            item("Acme", "One", "$15.00"),
            item("Acme", "Two", "$16.00"),
        ];
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.title, "New drops: 3 items from 2 sources");
        assert_eq!(
            msg.body_lines,
            vec!["• Acme: One; Two".to_string(), "• Zed: Zephyr".to_string()]
        );
        assert_eq!(msg.primary_id, items[0].1);
        assert_eq!(msg.all_ids.len(), 3);
    }

    #[test]
    fn multi_roaster_caps_titles_per_roaster() {
        let items = vec![
            item("Acme", "One", ""),
            item("Acme", "Two", ""),
            item("Acme", "Three", ""),
            item("Zed", "Zephyr", ""),
        ];
        let msg = compose(&items).expect("notification");
        assert_eq!(msg.body_lines[0], "• Acme: One; Two; +1 more");
    }
}
