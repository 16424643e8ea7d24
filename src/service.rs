//! The translation service facade.
//!
//! Composes the cache store, pending queue, dispatcher, backend and
//! persistent store into the public `lookup` / `set_target_lang` /
//! `clear_cache` / `load_cache` / `save_cache` / `dispose` surface.
//!
//! `lookup` is synchronous and never fails: a hit returns the cached
//! translation, a miss returns the input unchanged and queues work for the
//! next drain. One drain task at a time snapshots the queue, makes a single
//! batched backend call, writes results under the locale captured at
//! snapshot time and notifies exactly the subscribers waiting on each key.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::backend::{BatchItem, TranslationBackend};
use crate::context::TranslationContext;
use crate::key::build_key;
use crate::notify::{notify_handles, InvalidationDispatcher, SubscriberHandle};
use crate::pending::PendingQueue;
use crate::persist::{PersistError, PersistentStore};
use crate::store::CacheStore;

/// Service construction parameters.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Language the source strings are written in.
    pub source_lang: String,
    /// Initially active target locale.
    pub target_lang: String,
    /// Process-wide default context merged under every per-call context.
    pub global_context: Option<TranslationContext>,
    /// Quiet period collapsing repeated post-drain saves into one.
    pub save_debounce: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_lang: "en".into(),
            target_lang: "en".into(),
            global_context: None,
            save_debounce: Duration::from_secs(2),
        }
    }
}

impl TranslationConfig {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            ..Self::default()
        }
    }

    pub fn with_global_context(mut self, context: TranslationContext) -> Self {
        self.global_context = Some(context);
        self
    }

    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }
}

/// State mutated only under one lock, by `lookup`, `set_target_lang` and the
/// drain task.
struct State {
    cache: CacheStore,
    pending: PendingQueue,
    dispatcher: InvalidationDispatcher,
    target_lang: String,
}

struct Inner {
    source_lang: String,
    global_context: Option<TranslationContext>,
    save_debounce: Duration,
    backend: Mutex<Option<Arc<dyn TranslationBackend>>>,
    persist: Arc<dyn PersistentStore>,
    state: Mutex<State>,
    /// True while a drain task exists or is about to; makes
    /// `ensure_tick_scheduled` idempotent between drains.
    scheduled: AtomicBool,
    /// Re-entrancy guard: drains never overlap.
    processing: AtomicBool,
    disposed: AtomicBool,
    /// Debounce epoch; only the newest scheduled save actually writes.
    save_epoch: AtomicU64,
    runtime: Handle,
}

/// Keyed, context-sensitive translation cache with request coalescing and
/// batched fulfillment.
///
/// Must be constructed inside a Tokio runtime; the runtime handle is captured
/// for the deferred drain and save tasks. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<Inner>,
}

impl TranslationService {
    pub fn new(
        config: TranslationConfig,
        backend: impl TranslationBackend + 'static,
        persist: impl PersistentStore + 'static,
    ) -> Self {
        info!(
            source = %config.source_lang,
            target = %config.target_lang,
            "translation service initialized"
        );
        Self {
            inner: Arc::new(Inner {
                source_lang: config.source_lang,
                global_context: config.global_context,
                save_debounce: config.save_debounce,
                backend: Mutex::new(Some(Arc::new(backend))),
                persist: Arc::new(persist),
                state: Mutex::new(State {
                    cache: CacheStore::new(),
                    pending: PendingQueue::new(),
                    dispatcher: InvalidationDispatcher::new(),
                    target_lang: config.target_lang,
                }),
                scheduled: AtomicBool::new(false),
                processing: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                save_epoch: AtomicU64::new(0),
                runtime: Handle::current(),
            }),
        }
    }

    /// Look up the translation for `content` under the active target locale.
    ///
    /// Returns the cached translation on a hit. On a miss, returns `content`
    /// unchanged, registers `handle` for a one-shot notification and queues
    /// the pair for the next batched fulfillment. When the target locale
    /// equals the source language the cache is bypassed entirely.
    pub fn lookup(
        &self,
        content: &str,
        context: Option<&TranslationContext>,
        handle: &SubscriberHandle,
    ) -> String {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return content.to_string();
        }

        {
            let mut st = self.inner.state.lock();
            if st.target_lang == self.inner.source_lang {
                return content.to_string();
            }

            let merged = TranslationContext::merge(self.inner.global_context.as_ref(), context);
            let key = build_key(content, merged.as_ref());

            if let Some(hit) = st.cache.get(&st.target_lang, &key) {
                return hit.to_string();
            }

            st.pending.enqueue(key.clone(), content, merged.as_ref(), handle.clone());
            st.dispatcher.register(&key, handle.clone());
        }

        self.ensure_tick_scheduled();
        content.to_string()
    }

    /// Change the active target locale. Entries cached under other locales
    /// are untouched; on an actual change every currently-registered
    /// subscriber is notified broadly so it re-evaluates its lookups.
    pub fn set_target_lang(&self, target_lang: &str) {
        let handles = {
            let mut st = self.inner.state.lock();
            if st.target_lang == target_lang {
                return;
            }
            st.target_lang = target_lang.to_string();
            st.dispatcher.all_handles()
        };
        info!(target = target_lang, "target language changed");
        notify_handles(&handles);
    }

    pub fn target_lang(&self) -> String {
        self.inner.state.lock().target_lang.clone()
    }

    pub fn source_lang(&self) -> &str {
        &self.inner.source_lang
    }

    /// Clear the in-memory cache, the pending queue and the persisted
    /// snapshot. Persistence failures are logged, never propagated.
    pub fn clear_cache(&self) {
        {
            let mut st = self.inner.state.lock();
            st.cache.clear();
            st.pending.clear();
            st.dispatcher.drop_all();
        }
        if let Err(e) = self.inner.persist.clear() {
            warn!(error = %e, "persisted cache clear failed");
        }
        info!("translation cache cleared");
    }

    /// Restore the persisted snapshot into the in-memory cache. Entries
    /// already cached this session win on collision. Call once near startup,
    /// before the first lookup is trusted to reflect durable state.
    pub fn load_cache(&self) -> Result<(), PersistError> {
        let snapshot = self.inner.persist.load()?;
        let mut st = self.inner.state.lock();
        st.cache.restore(snapshot);
        debug!(entries = st.cache.len(), "cache restored from persistent store");
        Ok(())
    }

    /// Write the current cache to the persistent store immediately,
    /// bypassing the debounce.
    pub fn save_cache(&self) -> Result<(), PersistError> {
        let snapshot = self.inner.state.lock().cache.snapshot();
        self.inner.persist.save(&snapshot)
    }

    /// Release the backend and drop all internal state. Later lookups return
    /// their input unchanged and never schedule work.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        {
            let mut st = self.inner.state.lock();
            st.pending.clear();
            st.cache.clear();
            st.dispatcher.drop_all();
        }
        if let Some(backend) = self.inner.backend.lock().take() {
            backend.dispose();
        }
        info!("translation service disposed");
    }

    /// Number of entries awaiting fulfillment.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of cached translations across all locales.
    pub fn cached_count(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// Wait until every queued entry has been drained (or discarded) and no
    /// drain is running. Debounced saves may still be outstanding.
    pub async fn flush(&self) {
        loop {
            let idle = {
                let st = self.inner.state.lock();
                st.pending.is_empty()
                    && !self.inner.scheduled.load(Ordering::SeqCst)
                    && !self.inner.processing.load(Ordering::SeqCst)
            };
            if idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Spawn the deferred drain task unless one is already pending or
    /// running. Repeated calls between drains are no-ops.
    fn ensure_tick_scheduled(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.inner.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            drain(inner).await;
        });
    }
}

/// Drain loop: one batched backend call per iteration, re-draining
/// immediately while new entries keep arriving so nothing queued mid-batch
/// is starved. Exits with `scheduled` false so the next lookup can schedule
/// a fresh tick.
async fn drain(inner: Arc<Inner>) {
    if inner.processing.swap(true, Ordering::SeqCst) {
        return;
    }

    loop {
        // Snapshot the queue and the locale it was queued under. The exit
        // decision shares the lock with `enqueue`, so an entry added after
        // the emptiness check always finds `scheduled` already reset.
        let (batch, target) = {
            let mut st = inner.state.lock();
            if st.pending.is_empty() || inner.disposed.load(Ordering::SeqCst) {
                inner.processing.store(false, Ordering::SeqCst);
                inner.scheduled.store(false, Ordering::SeqCst);
                return;
            }
            (st.pending.take_all(), st.target_lang.clone())
        };

        let backend = inner.backend.lock().clone();
        let Some(backend) = backend else {
            inner.processing.store(false, Ordering::SeqCst);
            inner.scheduled.store(false, Ordering::SeqCst);
            return;
        };

        let items: Vec<BatchItem> = batch
            .iter()
            .map(|entry| BatchItem {
                content: entry.content.clone(),
                context: entry.context.clone(),
            })
            .collect();

        debug!(batch = items.len(), target = %target, "draining pending translations");

        // The only suspension point: lookups keep enqueueing while this
        // call is in flight.
        let result = backend
            .translate_batch(&items, &inner.source_lang, &target)
            .await;

        if inner.disposed.load(Ordering::SeqCst) {
            inner.processing.store(false, Ordering::SeqCst);
            inner.scheduled.store(false, Ordering::SeqCst);
            return;
        }

        match result {
            Ok(results) => {
                if results.len() != batch.len() {
                    warn!(
                        requested = batch.len(),
                        returned = results.len(),
                        "result count mismatch, applying positionally"
                    );
                }
                let notified: Vec<Vec<SubscriberHandle>> = {
                    let mut st = inner.state.lock();
                    batch
                        .iter()
                        .zip(results)
                        .map(|(entry, result)| {
                            // Written under the locale captured at snapshot
                            // time, not the possibly-changed current one.
                            st.cache.put(&target, entry.key.clone(), result);
                            st.dispatcher.take(&entry.key)
                        })
                        .collect()
                };
                for handles in &notified {
                    notify_handles(handles);
                }
                schedule_save(&inner);
            }
            Err(err) if err.is_retryable() => {
                warn!(error = %err, entries = batch.len(), "batch failed, requeueing");
                let mut st = inner.state.lock();
                let arrived_mid_batch = !st.pending.is_empty();
                st.pending.restore(batch);
                if !arrived_mid_batch {
                    // Nothing new to send; retry when the next lookup
                    // schedules a tick instead of spinning on the failure.
                    inner.processing.store(false, Ordering::SeqCst);
                    inner.scheduled.store(false, Ordering::SeqCst);
                    return;
                }
            }
            Err(err) => {
                error!(
                    error = %err,
                    dropped = batch.len(),
                    "batch failed permanently, discarding entries"
                );
                // Waiters are never notified for these keys; they re-enqueue
                // on their next lookup.
                let mut st = inner.state.lock();
                for entry in &batch {
                    let _ = st.dispatcher.take(&entry.key);
                }
            }
        }
    }
}

/// Debounced post-drain save: each call moves the epoch forward and only the
/// task holding the newest epoch writes, so drains inside the quiet window
/// collapse into one save.
fn schedule_save(inner: &Arc<Inner>) {
    let epoch = inner.save_epoch.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = inner.save_debounce;
    let runtime = inner.runtime.clone();
    let inner = Arc::clone(inner);
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if inner.save_epoch.load(Ordering::SeqCst) != epoch
            || inner.disposed.load(Ordering::SeqCst)
        {
            return;
        }
        let snapshot = inner.state.lock().cache.snapshot();
        match inner.persist.save(&snapshot) {
            Ok(()) => debug!(partitions = snapshot.len(), "cache snapshot saved"),
            Err(e) => warn!(error = %e, "cache save failed, in-memory state unaffected"),
        }
    });
}
