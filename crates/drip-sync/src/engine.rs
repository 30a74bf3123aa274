//! The reconciliation engine: one full pass over every configured roaster.
//!
//! A run loads the remote index once, scrapes each source sequentially,
//! classifies items as new or known, persists remote-first, sweeps staleness
//! for the sources that fetched successfully, and delivers one notification
//! covering all new items. A failed source skips its scrape AND its staleness
//! sweep, so a roaster outage never marks its catalogue out of stock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use drip_adapters::RoasterAdapter;
use drip_core::notify::{compose, Notification};
use drip_core::{identity::product_id, timestamp_now, Product, ProductRecord};
use drip_storage::remote::DocFields;
use drip_storage::{MirrorStore, Notifier, PageFetcher, RemoteStore};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub collection: String,
    pub politeness_delay: Duration,
}

/// Outcome counters for one run. Printed unconditionally so a cron log always
/// shows what happened.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_total: usize,
    pub sources_failed: usize,
    pub items_seen: usize,
    pub new_items: usize,
    pub stale_remote: u64,
    pub stale_local: u64,
    pub notified: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources ({} failed), {} items seen, {} new, {} marked stale remotely, {} locally{}",
            self.sources_total,
            self.sources_failed,
            self.items_seen,
            self.new_items,
            self.stale_remote,
            self.stale_local,
            if self.notified { ", notification sent" } else { "" },
        )
    }
}

pub struct Monitor<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub remote: &'a dyn RemoteStore,
    pub mirror: &'a MirrorStore,
    pub notifier: &'a dyn Notifier,
    pub options: RunOptions,
}

impl Monitor<'_> {
    /// One reconciliation pass over `adapters`.
    pub async fn run_once(&self, adapters: &[Box<dyn RoasterAdapter>]) -> Result<RunSummary> {
        let now = timestamp_now();
        // One index load per run; every classification in this pass sees the
        // same snapshot.
        let index: HashMap<String, DocFields> = self
            .remote
            .stream(&self.options.collection)
            .await
            .context("loading remote index")?
            .into_iter()
            .collect();
        info!(documents = index.len(), "remote index loaded");

        let mut summary = RunSummary {
            sources_total: adapters.len(),
            ..RunSummary::default()
        };
        let mut new_items: Vec<(Product, String)> = Vec::new();
        // Only sources whose listing fetch succeeded get a staleness sweep.
        let mut sweeps: Vec<(String, HashSet<String>, HashSet<String>)> = Vec::new();

        for (i, adapter) in adapters.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let roaster = adapter.name();
            let html = match self.fetcher.fetch_text(adapter.listing_url()).await {
                Ok(html) => html,
                Err(err) => {
                    warn!(roaster, %err, "listing fetch failed; skipping source");
                    summary.sources_failed += 1;
                    continue;
                }
            };

            let products = adapter.parse_listing(&html);
            info!(roaster, items = products.len(), "listing parsed");
            summary.items_seen += products.len();

            let mut seen_ids = HashSet::new();
            let mut seen_urls = HashSet::new();
            for mut product in products {
                self.enrich(adapter.as_ref(), &mut product).await;
                let id = product_id(&product.url);
                let known = index.contains_key(&id);
                match self.persist(&product, &id, known, &index, &now).await {
                    Ok(()) => {
                        seen_ids.insert(id.clone());
                        seen_urls.insert(product.url.clone());
                        if !known {
                            new_items.push((product, id));
                        }
                    }
                    // An unpersisted item stays out of the seen sets: better
                    // to re-announce it next run than to record it as seen.
                    Err(err) => warn!(roaster, url = %product.url, %err, "persist failed"),
                }
            }
            sweeps.push((roaster.to_string(), seen_ids, seen_urls));
        }

        // Sweep failures are per roaster, per store: a transient error here
        // must not block the other sources' sweeps or the notification. The
        // new items are already persisted, so a skipped announcement would
        // never be retried.
        for (roaster, seen_ids, seen_urls) in &sweeps {
            match self
                .remote
                .mark_absent_out_of_stock(&self.options.collection, roaster, seen_ids)
                .await
            {
                Ok(updated) => summary.stale_remote += updated,
                Err(err) => warn!(roaster, %err, "remote staleness sweep failed"),
            }
            match self.mirror.mark_absent_out_of_stock(roaster, seen_urls).await {
                Ok(updated) => summary.stale_local += updated,
                Err(err) => warn!(roaster, %err, "local staleness sweep failed"),
            }
        }

        summary.new_items = new_items.len();
        if let Some(message) = compose(&new_items) {
            self.notifier.deliver(&message).await;
            summary.notified = true;
        }
        Ok(summary)
    }

    /// Best-effort detail-page enrichment. Failures leave the
    /// listing-derived fields in place.
    async fn enrich(&self, adapter: &dyn RoasterAdapter, product: &mut Product) {
        self.pause().await;
        match self.fetcher.fetch_text(&product.url).await {
            Ok(page) => adapter.parse_details(&page).apply_to(product),
            Err(err) => debug!(url = %product.url, %err, "detail fetch failed"),
        }
    }

    /// Remote write first, mirror second. The merge mask omits `first_seen`
    /// for known items so the remote value is never overwritten.
    async fn persist(
        &self,
        product: &Product,
        id: &str,
        known: bool,
        index: &HashMap<String, DocFields>,
        now: &str,
    ) -> Result<()> {
        let Value::Object(mut fields) = serde_json::to_value(product)? else {
            unreachable!("a struct serializes to an object");
        };
        fields.insert("last_seen".into(), Value::from(now));
        if !known {
            fields.insert("first_seen".into(), Value::from(now));
        }
        self.remote
            .upsert_merge(&self.options.collection, id, fields)
            .await
            .context("remote upsert")?;

        let first_seen = index
            .get(id)
            .and_then(|doc| doc.get("first_seen"))
            .and_then(Value::as_str)
            .unwrap_or(now)
            .to_string();
        self.mirror
            .upsert(&ProductRecord {
                product: product.clone(),
                first_seen,
                last_seen: now.to_string(),
            })
            .await
            .context("mirror upsert")?;
        Ok(())
    }

    async fn pause(&self) {
        if !self.options.politeness_delay.is_zero() {
            tokio::time::sleep(self.options.politeness_delay).await;
        }
    }
}

/// Fabricated new items for exercising the notification path without touching
/// any store or network. Items are spread round-robin over `roasters`.
pub fn simulate_items(count: usize, roasters: &[String]) -> Vec<(Product, String)> {
    let fallback = vec!["Simulated Roasters".to_string()];
    let roasters = if roasters.is_empty() { &fallback } else { roasters };
    (0..count)
        .map(|i| {
            let roaster = &roasters[i % roasters.len()];
            let slug = roaster.to_ascii_lowercase().replace(' ', "-");
            let url = format!("https://example.test/{slug}/products/simulated-{i}");
            let mut p = Product::new(roaster.clone(), format!("Simulated Coffee {i}"), url.clone());
            if i % 3 != 2 {
                p.price_text = format!("${}.00", 15 + i);
            }
            (p, product_id(&url))
        })
        .collect()
}

/// Compose the notification a simulated drop would produce.
pub fn simulate(count: usize, roasters: &[String]) -> Option<Notification> {
    compose(&simulate_items(count, roasters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_spreads_items_over_roasters() {
        let roasters = vec!["Acme".to_string(), "Zed".to_string()];
        let items = simulate_items(5, &roasters);
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].0.roaster, "Acme");
        assert_eq!(items[1].0.roaster, "Zed");
        assert_eq!(items[4].0.roaster, "Acme");
        // Every third item has no price, exercising the placeholder path.
        assert!(items[2].0.price_text.is_empty());
    }

    #[test]
    fn simulation_composes_a_multi_source_notification() {
        let roasters = vec!["Acme".to_string(), "Zed".to_string()];
        let msg = simulate(4, &roasters).expect("notification");
        assert_eq!(msg.title, "New drops: 4 items from 2 sources");
        assert_eq!(msg.all_ids.len(), 4);
    }

    #[test]
    fn simulation_defaults_the_roaster_list() {
        let msg = simulate(1, &[]).expect("notification");
        assert!(msg.title.starts_with("New from Simulated Roasters:"));
    }
}
