//! Core domain model for the coffee drop monitor.

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub mod identity;
pub mod notify;

pub const CRATE_NAME: &str = "drip-core";

/// Timestamp layout shared by both stores, e.g. `2026-08-23 06:00:00+0000`.
pub const ISO_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Current UTC time rendered in the persisted timestamp layout.
pub fn timestamp_now() -> String {
    Utc::now().format(ISO_FORMAT).to_string()
}

/// One scraped product on a roaster's site.
///
/// Enrichment fields default to empty strings when a detail page does not
/// expose them. The wire/database field for the price is `price`; the struct
/// keeps the scrape-time name `price_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub roaster: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "price")]
    pub price_text: String,
    pub in_stock: bool,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub variety: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub image: String,
}

impl Product {
    pub fn new(roaster: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            roaster: roaster.into(),
            title: title.into(),
            url: url.into(),
            price_text: String::new(),
            in_stock: true,
            producer: String::new(),
            country: String::new(),
            region: String::new(),
            process: String::new(),
            variety: String::new(),
            notes: String::new(),
            profile: String::new(),
            image: String::new(),
        }
    }

    /// Stable identifier derived from the product URL.
    pub fn id(&self) -> String {
        identity::product_id(&self.url)
    }
}

/// A product plus its lifecycle timestamps, as persisted remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(flatten)]
    pub product: Product,
    pub first_seen: String,
    pub last_seen: String,
}

/// One append-only entry in a tried record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriedEvent {
    pub tried_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<i64>,
}

/// Ledger record for a coffee that has been tried, keyed by product id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriedRecord {
    pub doc_id: String,
    pub url: String,
    pub roaster: String,
    pub title: String,
    pub last_tried_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rating: Option<i64>,
    #[serde(default)]
    pub history: Vec<TriedEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trips_through_iso_layout() {
        let ts = timestamp_now();
        chrono::DateTime::parse_from_str(&ts, ISO_FORMAT).expect("parse own timestamp");
    }

    #[test]
    fn product_serializes_price_under_wire_name() {
        let mut p = Product::new("Acme", "Dark Roast", "https://acme.test/products/dark");
        p.price_text = "$16.00".into();
        let value = serde_json::to_value(&p).expect("serialize");
        assert_eq!(value["price"], "$16.00");
        assert!(value.get("price_text").is_none());
    }

    #[test]
    fn tried_event_omits_absent_optionals() {
        let event = TriedEvent {
            tried_on: "2026-08-23 06:00:00+0000".into(),
            notes: None,
            rating: None,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert!(value.get("notes").is_none());
        assert!(value.get("rating").is_none());
    }
}
