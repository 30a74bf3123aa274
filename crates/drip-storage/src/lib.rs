//! Persistence and transport adapters: HTTP fetch, the remote document
//! store, the local SQLite mirror, and ntfy push delivery.

pub mod fetch;
pub mod mirror;
pub mod ntfy;
pub mod remote;

pub const CRATE_NAME: &str = "drip-storage";

pub use fetch::{BackoffPolicy, FetchError, HttpClientConfig, HttpFetcher, PageFetcher};
pub use mirror::{remove_mirror_files, MirrorRow, MirrorStore};
pub use ntfy::{Notifier, NtfyConfig, NtfyNotifier};
pub use remote::{DocFields, FirestoreStore, RemoteStore, StoreError, STALE_BATCH_SIZE};
