//! Remote document store: capability trait plus a Firestore REST adapter.
//!
//! The monitor treats the remote collection as the source of truth. All
//! writes use merge semantics so a partial update never clobbers fields it
//! does not mention. The Firestore implementation talks to the v1 REST API
//! with an optional bearer token; pointing `emulator_host` at a local
//! emulator switches the base URL and drops TLS.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Flat document payload: field name -> JSON value.
pub type DocFields = Map<String, Value>;

/// Staleness and delete sweeps are issued in batches of this size so a large
/// collection never exceeds a single request limit.
pub const STALE_BATCH_SIZE: usize = 400;

/// Pause between destructive delete batches.
const DELETE_BATCH_PAUSE: Duration = Duration::from_millis(100);

const LIST_PAGE_SIZE: usize = 300;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store returned http {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed remote document: {0}")]
    Decode(String),
}

/// Operations the reconciliation engine and tried ledger need from the
/// remote store. Implementations return explicit errors; the engine decides
/// which failures skip an item and which abort a run.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or update one document, merging the given fields.
    async fn upsert_merge(
        &self,
        collection: &str,
        doc_id: &str,
        fields: DocFields,
    ) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<DocFields>, StoreError>;

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), StoreError>;

    /// Full collection read, paged internally. Returns `(doc_id, fields)`.
    async fn stream(&self, collection: &str) -> Result<Vec<(String, DocFields)>, StoreError>;

    /// Set `in_stock=false` on every document of the roaster whose id is not
    /// in `seen_ids`. Returns the number of documents updated.
    async fn mark_absent_out_of_stock(
        &self,
        collection: &str,
        roaster: &str,
        seen_ids: &HashSet<String>,
    ) -> Result<u64, StoreError>;

    /// Merge-write `fields` and append `history_entry` to the document's
    /// `history` array in the same commit.
    async fn upsert_with_history(
        &self,
        collection: &str,
        doc_id: &str,
        fields: DocFields,
        history_entry: Value,
    ) -> Result<(), StoreError>;

    /// Destructive: delete every document in the collection, batched.
    async fn delete_collection(&self, collection: &str) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    /// `{base}/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// `projects/{project}/databases/(default)/documents` (resource names)
    documents_name: String,
    bearer_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(
        project_id: &str,
        emulator_host: Option<&str>,
        bearer_token: Option<String>,
    ) -> Result<Self, StoreError> {
        let api_base = match emulator_host {
            Some(host) => format!("http://{}/v1", host.trim_end_matches('/')),
            None => "https://firestore.googleapis.com/v1".to_string(),
        };
        let documents_name = format!("projects/{project_id}/databases/(default)/documents");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            documents_url: format!("{api_base}/{documents_name}"),
            documents_name,
            bearer_token,
        })
    }

    fn doc_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{collection}/{doc_id}", self.documents_url)
    }

    fn doc_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{collection}/{doc_id}", self.documents_name)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                url: resp.url().to_string(),
            })
        }
    }

    /// Documents of one roaster, for the staleness sweep.
    async fn query_by_roaster(
        &self,
        collection: &str,
        roaster: &str,
    ) -> Result<Vec<String>, StoreError> {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "roaster" },
                        "op": "EQUAL",
                        "value": { "stringValue": roaster }
                    }
                }
            }
        });
        let url = format!("{}:runQuery", self.documents_url);
        let resp = Self::check(self.authorized(self.client.post(&url)).json(&body).send().await?)
            .await?;
        let results: Vec<Value> = resp.json().await?;
        let mut names = Vec::new();
        for entry in results {
            if let Some(name) = entry
                .get("document")
                .and_then(|d| d.get("name"))
                .and_then(Value::as_str)
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn batch_write(&self, writes: &[Value]) -> Result<(), StoreError> {
        let url = format!("{}:batchWrite", self.documents_url);
        let body = json!({ "writes": writes });
        Self::check(self.authorized(self.client.post(&url)).json(&body).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    async fn upsert_merge(
        &self,
        collection: &str,
        doc_id: &str,
        fields: DocFields,
    ) -> Result<(), StoreError> {
        let mask: Vec<(&str, &str)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.as_str()))
            .collect();
        let body = json!({ "fields": fields_to_firestore(&fields) });
        let resp = self
            .authorized(self.client.patch(self.doc_url(collection, doc_id)))
            .query(&mask)
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<DocFields>, StoreError> {
        let resp = self
            .authorized(self.client.get(self.doc_url(collection, doc_id)))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Value = Self::check(resp).await?.json().await?;
        Ok(Some(document_fields(&doc)?))
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), StoreError> {
        let resp = self
            .authorized(self.client.delete(self.doc_url(collection, doc_id)))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn stream(&self, collection: &str) -> Result<Vec<(String, DocFields)>, StoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .authorized(self.client.get(&url))
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let page: Value = Self::check(req.send().await?).await?.json().await?;
            if let Some(documents) = page.get("documents").and_then(Value::as_array) {
                for doc in documents {
                    out.push((document_id(doc)?, document_fields(doc)?));
                }
            }
            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn mark_absent_out_of_stock(
        &self,
        collection: &str,
        roaster: &str,
        seen_ids: &HashSet<String>,
    ) -> Result<u64, StoreError> {
        let names = self.query_by_roaster(collection, roaster).await?;
        let stale: Vec<&String> = names
            .iter()
            .filter(|name| {
                let id = name.rsplit('/').next().unwrap_or_default();
                !seen_ids.contains(id)
            })
            .collect();

        let mut updated = 0u64;
        for chunk in stale.chunks(STALE_BATCH_SIZE) {
            let writes: Vec<Value> = chunk
                .iter()
                .map(|name| {
                    json!({
                        "update": {
                            "name": name,
                            "fields": { "in_stock": { "booleanValue": false } }
                        },
                        "updateMask": { "fieldPaths": ["in_stock"] }
                    })
                })
                .collect();
            self.batch_write(&writes).await?;
            updated += chunk.len() as u64;
        }
        debug!(roaster, updated, "remote staleness sweep");
        Ok(updated)
    }

    async fn upsert_with_history(
        &self,
        collection: &str,
        doc_id: &str,
        fields: DocFields,
        history_entry: Value,
    ) -> Result<(), StoreError> {
        let mask: Vec<Value> = fields.keys().map(|k| Value::from(k.as_str())).collect();
        let body = json!({
            "writes": [{
                "update": {
                    "name": self.doc_name(collection, doc_id),
                    "fields": fields_to_firestore(&fields)
                },
                "updateMask": { "fieldPaths": mask },
                "updateTransforms": [{
                    "fieldPath": "history",
                    "appendMissingElements": {
                        "values": [json_to_firestore(&history_entry)]
                    }
                }]
            }]
        });
        let url = format!("{}:commit", self.documents_url);
        Self::check(self.authorized(self.client.post(&url)).json(&body).send().await?).await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<u64, StoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let mut total = 0u64;
        loop {
            let page: Value = Self::check(
                self.authorized(self.client.get(&url))
                    .query(&[("pageSize", STALE_BATCH_SIZE.to_string())])
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await?;
            let Some(documents) = page.get("documents").and_then(Value::as_array) else {
                break;
            };
            if documents.is_empty() {
                break;
            }
            let writes: Vec<Value> = documents
                .iter()
                .filter_map(|d| d.get("name").and_then(Value::as_str))
                .map(|name| json!({ "delete": name }))
                .collect();
            total += writes.len() as u64;
            self.batch_write(&writes).await?;
            tokio::time::sleep(DELETE_BATCH_PAUSE).await;
        }
        Ok(total)
    }
}

fn document_id(doc: &Value) -> Result<String, StoreError> {
    doc.get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .map(ToString::to_string)
        .ok_or_else(|| StoreError::Decode("document without a name".into()))
}

fn document_fields(doc: &Value) -> Result<DocFields, StoreError> {
    let Some(fields) = doc.get("fields").and_then(Value::as_object) else {
        return Ok(Map::new());
    };
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), firestore_to_json(value)?);
    }
    Ok(out)
}

/// Encode a flat field map into Firestore's typed-value `fields` object.
pub fn fields_to_firestore(fields: &DocFields) -> Value {
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), json_to_firestore(value));
    }
    Value::Object(out)
}

fn json_to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(json_to_firestore).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let mut fields = Map::new();
            for (k, v) in map {
                fields.insert(k.clone(), json_to_firestore(v));
            }
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn firestore_to_json(value: &Value) -> Result<Value, StoreError> {
    let Some(obj) = value.as_object() else {
        return Err(StoreError::Decode(format!("expected typed value, got {value}")));
    };
    if let Some((kind, inner)) = obj.iter().next() {
        let decoded = match kind.as_str() {
            "nullValue" => Value::Null,
            "booleanValue" => inner.clone(),
            "stringValue" => inner.clone(),
            "timestampValue" => inner.clone(),
            "doubleValue" => inner.clone(),
            "integerValue" => {
                let n = inner
                    .as_str()
                    .and_then(|s| s.parse::<i64>().ok())
                    .or_else(|| inner.as_i64())
                    .ok_or_else(|| StoreError::Decode(format!("bad integerValue {inner}")))?;
                Value::from(n)
            }
            "arrayValue" => {
                let items = inner
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .map(firestore_to_json)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?
                    .unwrap_or_default();
                Value::Array(items)
            }
            "mapValue" => {
                let mut out = Map::new();
                if let Some(fields) = inner.get("fields").and_then(Value::as_object) {
                    for (k, v) in fields {
                        out.insert(k.clone(), firestore_to_json(v)?);
                    }
                }
                Value::Object(out)
            }
            other => {
                return Err(StoreError::Decode(format!("unsupported value kind {other}")));
            }
        };
        Ok(decoded)
    } else {
        Err(StoreError::Decode("empty typed value".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_value_codec_round_trips() {
        let mut fields = Map::new();
        fields.insert("roaster".into(), Value::from("Acme"));
        fields.insert("in_stock".into(), Value::from(true));
        fields.insert("last_rating".into(), Value::from(4));
        fields.insert(
            "history".into(),
            json!([{ "tried_on": "2026-08-23 06:00:00+0000", "rating": 4 }]),
        );

        let encoded = fields_to_firestore(&fields);
        assert_eq!(encoded["roaster"]["stringValue"], "Acme");
        assert_eq!(encoded["in_stock"]["booleanValue"], true);
        assert_eq!(encoded["last_rating"]["integerValue"], "4");

        let doc = json!({ "name": "projects/p/databases/(default)/documents/coffees/abc", "fields": encoded });
        let decoded = document_fields(&doc).expect("decode");
        assert_eq!(Value::Object(decoded), Value::Object(fields));
    }

    #[test]
    fn document_id_is_last_path_segment() {
        let doc = json!({ "name": "projects/p/databases/(default)/documents/coffees/deadbeef" });
        assert_eq!(document_id(&doc).expect("id"), "deadbeef");
    }

    #[test]
    fn missing_fields_decode_as_empty_map() {
        let doc = json!({ "name": "projects/p/databases/(default)/documents/coffees/x" });
        assert!(document_fields(&doc).expect("decode").is_empty());
    }
}
