//! lingo-cache: keyed, context-sensitive translation cache with request
//! coalescing and batched, retryable fulfillment.
//!
//! The expensive part of machine translation is the network call, so the
//! controller in front of it does the real work: serve hits synchronously,
//! coalesce every lookup raised within one tick into a single batched call,
//! keep at most one batch in flight, partition results by target locale,
//! requeue failed batches without losing waiters, and persist the cache on a
//! debounced schedule.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lingo_cache::{
//!     DeepSeekBackend, ExponentialBackoff, JsonFileStore, RetryingBackend,
//!     Subscriber, SubscriberHandle, TranslationConfig, TranslationService,
//! };
//!
//! struct Widget;
//! impl Subscriber for Widget {
//!     fn mark_stale(&self) { /* trigger a re-render */ }
//! }
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = RetryingBackend::new(
//!     DeepSeekBackend::from_env()?,
//!     ExponentialBackoff::default(),
//! );
//! let service = TranslationService::new(
//!     TranslationConfig::new("en", "fr"),
//!     backend,
//!     JsonFileStore::new("translations.json"),
//! );
//! service.load_cache()?;
//!
//! let widget = Arc::new(Widget);
//! let handle = SubscriberHandle::of(&widget);
//! // Returns "Home" now; the widget is marked stale once "fr" resolves.
//! let _text = service.lookup("Home", None, &handle);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod key;
pub mod notify;
pub mod pending;
pub mod persist;
pub mod retry;
pub mod service;
pub mod store;

pub use backend::deepseek::DeepSeekBackend;
pub use backend::{BackendError, BatchItem, RetryingBackend, TranslationBackend};
pub use context::{GlossaryEntry, TranslationContext};
pub use key::{build_key, CacheKey};
pub use notify::{Subscriber, SubscriberHandle};
pub use persist::sqlite::SqliteStore;
pub use persist::{InMemoryStore, JsonFileStore, PersistError, PersistentStore};
pub use retry::{ExponentialBackoff, RetryContext, RetryDecision, RetryPolicy};
pub use service::{TranslationConfig, TranslationService};
pub use store::CacheSnapshot;
