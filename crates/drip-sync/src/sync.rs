//! Wholesale mirror rebuild from the remote store, for a fresh machine or a
//! mirror that has drifted.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use drip_core::{timestamp_now, ProductRecord};
use drip_storage::{MirrorStore, RemoteStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub stale_local: u64,
    pub tried_flagged: usize,
}

/// Import every remote document into the mirror, mark local rows that no
/// longer exist remotely out of stock, and resync tried flags from the
/// ledger collection. `first_seen` on existing local rows is preserved.
pub async fn rebuild_mirror(
    remote: &dyn RemoteStore,
    mirror: &MirrorStore,
    collection: &str,
    tried_collection: &str,
) -> Result<SyncReport> {
    let now = timestamp_now();
    let docs = remote
        .stream(collection)
        .await
        .context("listing remote collection")?;

    let mut report = SyncReport::default();
    let mut urls_by_roaster: HashMap<String, HashSet<String>> = HashMap::new();
    for (doc_id, mut fields) in docs {
        for key in ["first_seen", "last_seen"] {
            fields
                .entry(key.to_string())
                .or_insert_with(|| Value::from(now.clone()));
        }
        let record: ProductRecord = match serde_json::from_value(Value::Object(fields)) {
            Ok(record) => record,
            Err(err) => {
                warn!(doc_id, %err, "skipping malformed remote document");
                continue;
            }
        };
        let inserted = mirror
            .upsert(&record)
            .await
            .with_context(|| format!("importing {}", record.product.url))?;
        if inserted {
            report.inserted += 1;
        } else {
            report.updated += 1;
        }
        urls_by_roaster
            .entry(record.product.roaster.clone())
            .or_default()
            .insert(record.product.url.clone());
    }

    // Rows the remote no longer has are stale, per roaster so an empty
    // remote roaster sweeps its whole local catalogue.
    for (roaster, urls) in &urls_by_roaster {
        report.stale_local += mirror
            .mark_absent_out_of_stock(roaster, urls)
            .await
            .with_context(|| format!("sweeping {roaster}"))?;
    }

    mirror
        .reset_tried_flags()
        .await
        .context("resetting tried flags")?;
    let tried_docs = remote
        .stream(tried_collection)
        .await
        .context("listing ledger collection")?;
    for (_, fields) in tried_docs {
        if let Some(url) = fields.get("url").and_then(Value::as_str) {
            if mirror.set_tried_flag(url, true).await? > 0 {
                report.tried_flagged += 1;
            }
        }
    }

    info!(
        inserted = report.inserted,
        updated = report.updated,
        stale = report.stale_local,
        tried = report.tried_flagged,
        "mirror rebuilt"
    );
    Ok(report)
}
