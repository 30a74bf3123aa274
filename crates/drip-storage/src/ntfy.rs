//! Push delivery over an ntfy server. Fire-and-forget: failures are logged
//! and never surfaced to the run.

use async_trait::async_trait;
use tracing::{debug, warn};

use drip_core::notify::Notification;

/// Deep links include at most this many ids to keep the click URL short.
const MAX_CLICK_IDS: usize = 6;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &Notification);
}

#[derive(Debug, Clone, Default)]
pub struct NtfyConfig {
    pub topic: Option<String>,
    pub server: String,
    /// Base URL of the site that renders `?id=` / `?ids=` deep links.
    pub site_base_url: Option<String>,
    /// Fallback click target when no site base is configured.
    pub click_url: Option<String>,
}

#[derive(Debug)]
pub struct NtfyNotifier {
    client: reqwest::Client,
    config: NtfyConfig,
}

impl NtfyNotifier {
    pub fn new(config: NtfyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn click_target(&self, message: &Notification) -> Option<String> {
        if let Some(site) = &self.config.site_base_url {
            let site = site.trim_end_matches('/');
            if message.all_ids.len() > 1 {
                let ids = message
                    .all_ids
                    .iter()
                    .take(MAX_CLICK_IDS)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                return Some(format!("{site}/?ids={ids}"));
            }
            return Some(format!("{site}/?id={}", message.primary_id));
        }
        self.config.click_url.clone()
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn deliver(&self, message: &Notification) {
        let Some(topic) = &self.config.topic else {
            debug!("no ntfy topic configured; skipping notification");
            return;
        };
        let server = self.config.server.trim_end_matches('/');
        let url = format!("{server}/{topic}");

        // Title goes in a query parameter: header values are latin-1 only
        // and roaster names are not.
        let mut request = self
            .client
            .post(&url)
            .query(&[("title", message.title.as_str()), ("priority", "high"), ("tags", "coffee")])
            .body(message.body_lines.join("\n"));
        if let Some(click) = self.click_target(message) {
            request = request.query(&[("click", click.as_str())]);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(topic, "notification delivered");
            }
            Ok(resp) => warn!(topic, status = %resp.status(), "ntfy rejected notification"),
            Err(err) => warn!(topic, %err, "ntfy delivery failed"),
        }
    }
}
