//! Content load state machine with cancellable multi-subscriber waits
//!
//! **Why**: Several consumers (renderer, scheduler, prefetch) want the same
//! resolved handle at overlapping times. Resolution must happen exactly
//! once per item, and the handle must be freed the moment nobody is
//! interested anymore.
//!
//! **Used by**: PlaylistManager (cache values), PlaybackScheduler (dwell
//! recomputation), rendering collaborator (display)
//!
//! # State machine
//!
//! New → Loading → Loaded. The New→Loading transition is a single
//! irrevocable gate taken under the item lock: no matter how many `load`
//! calls race, exactly one `resolve()` goes out. Success and failure both
//! land in Loaded: a failed or unrecognized slide is kind `Unsupported`
//! with an error string for its waiters, never a stuck state that blocks
//! later reads.
//!
//! # Callbacks
//!
//! Waiters fire in registration order and are always invoked with no
//! internal lock held, so a callback may re-enter the item's accessors.
//! The registry is retained after completion: late `load` callers are
//! served synchronously and still get a token to cancel with.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::source::{ContentSource, MediaInfo, MediaKind, ResourceHandle, SourceError};

/// Load lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    New,
    Loading,
    Loaded,
}

/// Opaque subscription token returned by [`ContentItem::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadToken(u64);

/// What waiters receive: resolved media info, or an error string.
pub type LoadResult = Result<MediaInfo, String>;

/// Waiter callback. Invoked at most once, outside the item's lock.
pub type LoadCallback = Box<dyn FnMut(&LoadResult) + Send>;

/// Error string delivered to waiters that subscribe after a full release.
const RELEASED: &str = "content released";

struct Waiter {
    token: u64,
    callback: LoadCallback,
}

struct ItemInner {
    state: LoadState,
    handle: Option<ResourceHandle>,
    result: Option<LoadResult>,
    waiters: Vec<Waiter>,
    next_token: u64,
    released: bool,
}

/// One content source's load state, shared between cache and consumers.
///
/// Not reusable after a full release; construct a fresh item to retry.
pub struct ContentItem {
    source: Arc<dyn ContentSource>,
    inner: Arc<Mutex<ItemInner>>,
}

impl ContentItem {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(ItemInner {
                state: LoadState::New,
                handle: None,
                result: None,
                waiters: Vec::new(),
                next_token: 0,
                released: false,
            })),
        }
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    /// Register a waiter for the load result.
    ///
    /// Kicks off resolution on the first call; later calls just wait. If
    /// the item is already Loaded the callback runs synchronously with the
    /// stored result. Either way the waiter stays registered until
    /// [`cancel_load`](Self::cancel_load).
    pub fn load(&self, callback: LoadCallback) -> LoadToken {
        let mut slot = Some(callback);
        let (token, begin, serve_now) = {
            let mut inner = self.inner.lock().unwrap();
            let token = inner.next_token;
            inner.next_token += 1;
            let begin = inner.state == LoadState::New;
            if begin {
                inner.state = LoadState::Loading;
            }
            let serve_now = if inner.state == LoadState::Loaded {
                if inner.released {
                    Some(Err(RELEASED.to_string()))
                } else {
                    inner.result.clone()
                }
            } else {
                None
            };
            // register under the same lock as the state check so a
            // completion landing in between cannot skip this waiter
            if serve_now.is_none()
                && let Some(callback) = slot.take()
            {
                inner.waiters.push(Waiter { token, callback });
            }
            (token, begin, serve_now)
        };

        if let Some(result) = serve_now
            && let Some(mut callback) = slot.take()
        {
            callback(&result);
            self.inner.lock().unwrap().waiters.push(Waiter { token, callback });
            return LoadToken(token);
        }

        if begin {
            self.begin_resolve();
        }
        LoadToken(token)
    }

    /// Remove a waiter. Unknown tokens are a no-op.
    ///
    /// When the removal empties the registry the handle is released on the
    /// spot, independent of cache eviction.
    pub fn cancel_load(&self, token: LoadToken) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.waiters.len();
        inner.waiters.retain(|w| w.token != token.0);
        if inner.waiters.len() != before && inner.waiters.is_empty() {
            debug!("Last waiter gone, releasing '{}'", self.source.id());
            Self::release_inner(&mut inner);
        }
    }

    /// Free the underlying handle. Idempotent; also called on cache
    /// eviction.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        Self::release_inner(&mut inner);
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock().unwrap().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Resolved kind; `None` until Loaded, `Unsupported` after a failure.
    pub fn kind(&self) -> Option<MediaKind> {
        let inner = self.inner.lock().unwrap();
        if inner.state != LoadState::Loaded {
            return None;
        }
        Some(match &inner.result {
            Some(Ok(info)) => info.kind,
            _ => MediaKind::Unsupported,
        })
    }

    /// Media duration in seconds; 0 for images, failures, and items that
    /// have not finished loading.
    pub fn duration_secs(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        match &inner.result {
            Some(Ok(info)) => info.duration_secs,
            _ => 0.0,
        }
    }

    /// Natural pixel size once loaded.
    pub fn size(&self) -> Option<(u32, u32)> {
        let inner = self.inner.lock().unwrap();
        match &inner.result {
            Some(Ok(info)) => Some((info.width, info.height)),
            _ => None,
        }
    }

    /// Number of registered waiters (diagnostics).
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().unwrap().waiters.len()
    }

    fn begin_resolve(&self) {
        debug!(
            "Resolving '{}' ({})",
            self.source.name(),
            self.source.id()
        );
        let inner = Arc::clone(&self.inner);
        let sid = self.source.id().to_string();
        self.source.resolve(Box::new(move |outcome| {
            Self::complete(&inner, &sid, outcome);
        }));
    }

    /// Terminal transition: store the outcome and notify every waiter.
    fn complete(
        inner: &Arc<Mutex<ItemInner>>,
        sid: &str,
        outcome: Result<ResourceHandle, SourceError>,
    ) {
        let (result, mut pending) = {
            let mut guard = inner.lock().unwrap();
            if guard.state == LoadState::Loaded {
                warn!("Duplicate resolve completion for '{sid}' ignored");
                return;
            }
            guard.state = LoadState::Loaded;
            let result = match outcome {
                Ok(mut handle) => {
                    if guard.released {
                        // released mid-flight; don't adopt a dead handle
                        handle.release();
                        Err(RELEASED.to_string())
                    } else if handle.info().kind == MediaKind::Unsupported {
                        // Transport worked but the payload is neither image
                        // nor video: same terminal state as a hard failure.
                        handle.release();
                        Err(SourceError::Unsupported.to_string())
                    } else {
                        let info = handle.info().clone();
                        guard.handle = Some(handle);
                        Ok(info)
                    }
                }
                Err(err) => Err(err.to_string()),
            };
            if let Err(err) = &result {
                warn!("Load failed for '{sid}': {err}");
            }
            guard.result = Some(result.clone());
            (result, std::mem::take(&mut guard.waiters))
        };

        for waiter in &mut pending {
            (waiter.callback)(&result);
        }

        // Waiters that registered during dispatch were already served
        // synchronously; keep both sets registered, dispatch order first.
        let mut guard = inner.lock().unwrap();
        pending.append(&mut guard.waiters);
        guard.waiters = pending;
    }

    fn release_inner(inner: &mut ItemInner) {
        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
        inner.released = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::source::testing::{StubOutcome, StubSource};

    type Seen = Arc<Mutex<Vec<LoadResult>>>;

    fn recorder() -> (Seen, LoadCallback) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: LoadCallback = Box::new(move |result| {
            sink.lock().unwrap().push(result.clone());
        });
        (seen, callback)
    }

    /// Test: many waiters, one resolution
    /// Validates: New→Loading gate admits a single resolve() call
    #[test]
    fn test_single_resolution_many_waiters() {
        let source = StubSource::deferred("a", StubOutcome::Video(12.0));
        let item = ContentItem::new(source.clone());

        let (seen1, cb1) = recorder();
        let (seen2, cb2) = recorder();
        let (seen3, cb3) = recorder();
        item.load(cb1);
        item.load(cb2);
        item.load(cb3);

        assert_eq!(item.state(), LoadState::Loading);
        assert_eq!(source.resolve_calls.load(Ordering::SeqCst), 1);
        assert!(seen1.lock().unwrap().is_empty());

        assert!(source.complete_next());
        assert!(item.is_loaded());
        assert_eq!(item.kind(), Some(MediaKind::Video));
        assert_eq!(item.duration_secs(), 12.0);
        assert_eq!(item.size(), Some((1920, 1080)));

        for seen in [&seen1, &seen2, &seen3] {
            let results = seen.lock().unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(
                results[0].as_ref().map(|info| info.kind),
                Ok(MediaKind::Video)
            );
        }
        // registry retained after completion
        assert_eq!(item.waiter_count(), 3);
    }

    /// Test: late load after Loaded
    /// Validates: synchronous delivery of the stored result
    #[test]
    fn test_late_waiter_served_synchronously() {
        let item = ContentItem::new(StubSource::image("a"));
        let (first, cb) = recorder();
        item.load(cb);
        assert_eq!(first.lock().unwrap().len(), 1);

        let (late, cb) = recorder();
        item.load(cb);
        let results = late.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().map(|info| info.kind),
            Ok(MediaKind::Image)
        );
    }

    /// Test: cancel-all triggers exactly one release
    /// Validates: release-on-empty and token idempotence
    #[test]
    fn test_cancel_all_releases_once() {
        let source = StubSource::image("a");
        let item = ContentItem::new(source.clone());

        let (_seen1, cb1) = recorder();
        let (_seen2, cb2) = recorder();
        let token1 = item.load(cb1);
        let token2 = item.load(cb2);

        item.cancel_load(token1);
        assert_eq!(source.release_count.load(Ordering::SeqCst), 0);

        item.cancel_load(token2);
        assert_eq!(source.release_count.load(Ordering::SeqCst), 1);

        // already-cancelled tokens are no-ops
        item.cancel_load(token1);
        item.cancel_load(token2);
        assert_eq!(source.release_count.load(Ordering::SeqCst), 1);
    }

    /// Test: failure lands in Loaded/Unsupported
    /// Validates: failure is terminal data, not a panic
    #[test]
    fn test_failure_is_unsupported() {
        let item = ContentItem::new(StubSource::failing("bad"));
        let (seen, cb) = recorder();
        item.load(cb);

        assert!(item.is_loaded());
        assert_eq!(item.kind(), Some(MediaKind::Unsupported));
        assert_eq!(item.duration_secs(), 0.0);
        assert_eq!(item.size(), None);

        let results = seen.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    /// Test: kind is None before Loaded
    #[test]
    fn test_kind_unknown_before_loaded() {
        let source = StubSource::deferred("a", StubOutcome::Image);
        let item = ContentItem::new(source.clone());
        assert_eq!(item.kind(), None);

        let (_seen, cb) = recorder();
        item.load(cb);
        assert_eq!(item.kind(), None);

        source.complete_next();
        assert_eq!(item.kind(), Some(MediaKind::Image));
    }

    /// Test: explicit release is idempotent and cancellation stays safe
    #[test]
    fn test_release_idempotent() {
        let source = StubSource::image("a");
        let item = ContentItem::new(source.clone());
        let (_seen, cb) = recorder();
        let token = item.load(cb);

        item.release();
        item.release();
        assert_eq!(source.release_count.load(Ordering::SeqCst), 1);

        // no double release through the empty-registry path
        item.cancel_load(token);
        assert_eq!(source.release_count.load(Ordering::SeqCst), 1);
    }

    /// Test: subscribing after a full release yields an error
    /// Validates: released items are not reusable
    #[test]
    fn test_load_after_release_errors() {
        let item = ContentItem::new(StubSource::image("a"));
        let (_seen, cb) = recorder();
        let token = item.load(cb);
        item.cancel_load(token);

        let (late, cb) = recorder();
        item.load(cb);
        let results = late.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    /// Test: waiters fire in registration order
    #[test]
    fn test_waiter_order() {
        let source = StubSource::deferred("a", StubOutcome::Image);
        let item = ContentItem::new(source.clone());

        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3u8 {
            let sink = Arc::clone(&order);
            item.load(Box::new(move |_| {
                sink.lock().unwrap().push(tag);
            }));
        }
        source.complete_next();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
