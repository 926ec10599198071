//! Lazily loaded, shared capabilities.
//!
//! Some exports depend on a capability that is expensive to obtain and should only be obtained
//! once per process (the styled-document constructor).  [`CapabilityLoader`] memoizes it with
//! single-flight semantics: whoever calls first performs the fetch, concurrent callers wait for
//! that same fetch and share its outcome, and a failed fetch leaves the slot empty so the next
//! call starts over.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};

use log::{debug, error};

use crate::export::docx::{DocumentConstructor, DocxConstructor};

/// Failure to obtain a capability.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to load {capability}: {message}")]
pub struct CapabilityLoadError {
    capability: String,
    message: String,
}

impl CapabilityLoadError {
    /// Creates a new error for the named capability.
    pub fn new(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Name of the capability that failed to load.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Produces a capability on demand.
pub trait CapabilitySource<T>: Send + Sync {
    /// Fetches the capability.  Called at most once per successful load.
    fn fetch(&self) -> Result<T, CapabilityLoadError>;
}

impl<T, F> CapabilitySource<T> for F
where
    F: Fn() -> Result<T, CapabilityLoadError> + Send + Sync,
{
    fn fetch(&self) -> Result<T, CapabilityLoadError> {
        self()
    }
}

enum Slot<T> {
    Empty,
    Loading,
    Ready(T),
}

struct LoaderState<T> {
    slot: Slot<T>,
    /// Incremented every time a fetch starts.
    attempt: u64,
    /// Outcome of the most recent failed attempt, kept for its waiters.
    last_failure: Option<(u64, CapabilityLoadError)>,
}

/// Memoizing single-flight loader.
pub struct CapabilityLoader<T> {
    source: Box<dyn CapabilitySource<T>>,
    state: Mutex<LoaderState<T>>,
    settled: Condvar,
}

impl<T: Clone> CapabilityLoader<T> {
    /// Creates an empty loader that will fetch from `source`.
    pub fn new(source: impl CapabilitySource<T> + 'static) -> Self {
        Self {
            source: Box::new(source),
            state: Mutex::new(LoaderState {
                slot: Slot::Empty,
                attempt: 0,
                last_failure: None,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether the capability is loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self.lock().slot, Slot::Ready(_))
    }

    /// Returns the capability, fetching it if nobody has yet.
    pub fn get(&self) -> Result<T, CapabilityLoadError> {
        let mut state = self.lock();
        loop {
            match &state.slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Empty => break,
                Slot::Loading => {
                    let awaited = state.attempt;
                    state = self
                        .settled
                        .wait_while(state, |state| matches!(state.slot, Slot::Loading))
                        .unwrap_or_else(PoisonError::into_inner);
                    if let Some((attempt, err)) = &state.last_failure {
                        if *attempt == awaited && matches!(state.slot, Slot::Empty) {
                            return Err(err.clone());
                        }
                    }
                }
            }
        }

        state.slot = Slot::Loading;
        state.attempt += 1;
        let attempt = state.attempt;
        drop(state);

        debug!("Fetching capability (attempt {attempt})");
        let pending = PendingFetch {
            loader: self,
            attempt,
            finished: false,
        };
        let outcome = self.source.fetch();
        pending.finish(&outcome);
        outcome
    }
}

/// An in-flight fetch.  Dropping it unfinished (the fetch panicked) empties the slot.
struct PendingFetch<'a, T: Clone> {
    loader: &'a CapabilityLoader<T>,
    attempt: u64,
    finished: bool,
}

impl<T: Clone> PendingFetch<'_, T> {
    fn finish(mut self, outcome: &Result<T, CapabilityLoadError>) {
        let mut state = self.loader.lock();
        match outcome {
            Ok(value) => {
                state.slot = Slot::Ready(value.clone());
                state.last_failure = None;
            }
            Err(err) => {
                error!("Capability fetch failed, next call retries: {err}");
                state.slot = Slot::Empty;
                state.last_failure = Some((self.attempt, err.clone()));
            }
        }
        self.finished = true;
    }
}

impl<T: Clone> Drop for PendingFetch<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            error!("Capability fetch panicked, next call retries");
            let mut state = self.loader.lock();
            state.slot = Slot::Empty;
            state.last_failure = Some((
                self.attempt,
                CapabilityLoadError::new("capability", "fetch panicked"),
            ));
        }
        self.loader.settled.notify_all();
    }
}

/// The capability used by the styled-document export.
pub type DocumentCapability = Arc<dyn DocumentConstructor>;

/// Process-wide loader for the bundled styled-document constructor.
pub fn shared_document_loader() -> Arc<CapabilityLoader<DocumentCapability>> {
    static LOADER: OnceLock<Arc<CapabilityLoader<DocumentCapability>>> = OnceLock::new();
    LOADER
        .get_or_init(|| {
            Arc::new(CapabilityLoader::new(|| -> Result<DocumentCapability, CapabilityLoadError> {
                Ok(Arc::new(DocxConstructor::default()) as DocumentCapability)
            }))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_callers_share_one_fetch() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let loader = CapabilityLoader::new(move || -> Result<u32, CapabilityLoadError> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(42)
        });

        let barrier = Barrier::new(4);
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        loader.get()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("loader thread panicked"))
                .collect()
        });

        assert!(results.iter().all(|result| *result == Ok(42)));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }

    #[test]
    fn failed_fetch_is_retried_on_next_call() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let loader = CapabilityLoader::new(move || -> Result<&'static str, CapabilityLoadError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CapabilityLoadError::new("docx", "network unreachable"))
            } else {
                Ok("docx")
            }
        });

        let err = loader.get().unwrap_err();
        assert_eq!(err.message(), "network unreachable");
        assert!(!loader.is_loaded());

        assert_eq!(loader.get(), Ok("docx"));
        assert_eq!(loader.get(), Ok("docx"));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn waiters_of_a_failed_fetch_see_the_same_failure() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let loader = CapabilityLoader::new(move || -> Result<u8, CapabilityLoadError> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Err(CapabilityLoadError::new("docx", "boom"))
        });

        let barrier = Barrier::new(3);
        let failures = thread::scope(|scope| {
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        loader.get()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("loader thread panicked"))
                .filter(Result::is_err)
                .count()
        });

        assert_eq!(failures, 3);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_fetch_leaves_the_loader_usable() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let loader = CapabilityLoader::new(move || -> Result<u8, CapabilityLoadError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("constructor crashed");
            }
            Ok(7)
        });

        let crashed = panic::catch_unwind(AssertUnwindSafe(|| loader.get()));
        assert!(crashed.is_err());
        assert!(!loader.is_loaded());

        let retried = thread::scope(|scope| {
            scope
                .spawn(|| loader.get())
                .join()
                .expect("loader thread panicked")
        });
        assert_eq!(retried, Ok(7));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_loader_is_a_singleton() {
        let first = shared_document_loader();
        let second = shared_document_loader();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.get().is_ok());
    }
}
