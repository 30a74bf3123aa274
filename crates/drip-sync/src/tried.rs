//! The tried-coffee ledger: a separate remote collection keyed by product id,
//! with an append-only history per coffee.
//!
//! Items are addressed by id or by URL; either resolves through the main
//! collection so the ledger entry carries the roaster and title. Resolution
//! is best effort: a coffee purged from the catalogue can still be marked
//! (with blank roaster/title) and unmarked. Local mirror flags are best
//! effort and never fail a ledger operation.

use serde_json::{Map, Value};
use tracing::warn;

use drip_core::{identity::product_id, timestamp_now, TriedRecord};
use drip_storage::remote::DocFields;
use drip_storage::{MirrorStore, RemoteStore, StoreError};

#[derive(Debug, Clone)]
pub enum ItemRef {
    Id(String),
    Url(String),
}

/// Resolved identity of the coffee being marked.
struct ResolvedItem {
    id: String,
    url: String,
    roaster: String,
    title: String,
}

pub struct TriedLedger<'a> {
    pub remote: &'a dyn RemoteStore,
    /// Absent when the caller operates remote-only (e.g. after `clear-db`).
    pub mirror: Option<&'a MirrorStore>,
    pub collection: String,
    pub tried_collection: String,
}

impl TriedLedger<'_> {
    /// Record that a coffee has been tried. Re-marking the same coffee
    /// appends to its history and refreshes the `last_*` fields.
    pub async fn mark(
        &self,
        item: &ItemRef,
        notes: Option<String>,
        rating: Option<i64>,
    ) -> Result<String, StoreError> {
        let resolved = self.resolve(item).await;
        let now = timestamp_now();

        let mut fields = Map::new();
        fields.insert("url".into(), Value::from(resolved.url.clone()));
        fields.insert("roaster".into(), Value::from(resolved.roaster));
        fields.insert("title".into(), Value::from(resolved.title));
        fields.insert("last_tried_on".into(), Value::from(now.clone()));
        let mut entry = Map::new();
        entry.insert("tried_on".into(), Value::from(now));
        if let Some(notes) = notes {
            fields.insert("last_notes".into(), Value::from(notes.clone()));
            entry.insert("notes".into(), Value::from(notes));
        }
        if let Some(rating) = rating {
            fields.insert("last_rating".into(), Value::from(rating));
            entry.insert("rating".into(), Value::from(rating));
        }

        self.remote
            .upsert_with_history(
                &self.tried_collection,
                &resolved.id,
                fields,
                Value::Object(entry),
            )
            .await?;
        self.flag_mirror(&resolved.url, true).await;
        Ok(resolved.id)
    }

    /// Remove a coffee from the ledger entirely, history included.
    /// Idempotent: unmarking something never marked is not an error.
    pub async fn unmark(&self, item: &ItemRef) -> Result<String, StoreError> {
        let (id, mut url) = match item {
            ItemRef::Id(id) => (id.clone(), None),
            ItemRef::Url(url) => (product_id(url), Some(url.clone())),
        };
        if url.is_none() {
            // The ledger entry is the only place the URL for the mirror
            // flag can come from when the caller gave an id.
            url = match self.remote.get(&self.tried_collection, &id).await {
                Ok(doc) => doc.and_then(|doc| {
                    doc.get("url").and_then(Value::as_str).map(str::to_string)
                }),
                Err(err) => {
                    warn!(id, %err, "ledger lookup failed before delete");
                    None
                }
            };
        }

        self.remote.delete(&self.tried_collection, &id).await?;
        if let Some(url) = url {
            self.flag_mirror(&url, false).await;
        }
        Ok(id)
    }

    /// Every ledger entry, most recently tried first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<TriedRecord>, StoreError> {
        let docs = self.remote.stream(&self.tried_collection).await?;
        let mut records = Vec::with_capacity(docs.len());
        for (doc_id, mut fields) in docs {
            fields.insert("doc_id".into(), Value::from(doc_id.clone()));
            match serde_json::from_value::<TriedRecord>(Value::Object(fields)) {
                Ok(record) => records.push(record),
                Err(err) => warn!(doc_id, %err, "skipping malformed ledger entry"),
            }
        }
        records.sort_by(|a, b| b.last_tried_on.cmp(&a.last_tried_on));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Resolve an id or URL to a full identity via the main collection.
    /// Best effort: a lookup miss or failure leaves roaster/title (and, for
    /// an id, the URL) blank rather than refusing the operation.
    async fn resolve(&self, item: &ItemRef) -> ResolvedItem {
        let (id, url) = match item {
            ItemRef::Id(id) => (id.clone(), None),
            ItemRef::Url(url) => (product_id(url), Some(url.clone())),
        };
        let doc = match self.remote.get(&self.collection, &id).await {
            Ok(doc) => doc.unwrap_or_default(),
            Err(err) => {
                warn!(id, %err, "main collection lookup failed");
                DocFields::default()
            }
        };
        ResolvedItem {
            url: url.unwrap_or_else(|| field_str(&doc, "url")),
            roaster: field_str(&doc, "roaster"),
            title: field_str(&doc, "title"),
            id,
        }
    }

    async fn flag_mirror(&self, url: &str, tried: bool) {
        let Some(mirror) = self.mirror else { return };
        if url.is_empty() {
            return;
        }
        if let Err(err) = mirror.set_tried_flag(url, tried).await {
            warn!(url, %err, "mirror tried-flag update failed");
        }
    }
}

fn field_str(fields: &DocFields, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
