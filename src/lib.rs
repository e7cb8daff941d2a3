pub mod config;
pub mod detector;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod store;

pub use config::Config;
pub use detector::{ChangeDetector, CycleOutcome, Delivery, NotifyPolicy};
pub use error::{exit_code, CycleError, FetchError, NotifyError, ParseError, StoreError};
pub use fetcher::{FileFetcher, Fetcher, HttpFetcher, PageSource, QueryCredentials};
pub use fingerprint::fingerprint;
pub use models::*;
pub use notifications::{EmailNotifier, MessageTemplate, Notification, NotificationKind, Notifier};
pub use store::{JsonStateStore, MemoryStateStore, StateStore};
