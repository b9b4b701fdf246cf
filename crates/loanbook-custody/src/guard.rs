//! Operation guard shared by the custody registry and the engines built on it
//!
//! Engines created over the same registry share one lock, so their mutating
//! operations run one at a time. Callers on other tasks wait for the lock.
//! A task that already holds the lock (an engine calling custody, or a
//! receive hook calling another engine) passes through without locking
//! again, but a task entering an engine it is already inside is refused.

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

tokio::task_local! {
    /// (domain, engine) pairs the current task is inside of
    static ENTERED: RefCell<Vec<(u64, u64)>>;
}

/// Serializes the mutating operations of one engine within its domain
#[derive(Debug, Clone)]
pub struct OpGuard {
    domain: u64,
    engine: u64,
    lock: Arc<Mutex<()>>,
}

impl OpGuard {
    /// A guard opening a new domain
    pub fn new() -> Self {
        Self {
            domain: next_id(),
            engine: next_id(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// A guard for another engine in the same domain
    pub fn sibling(&self) -> Self {
        Self {
            domain: self.domain,
            engine: next_id(),
            lock: self.lock.clone(),
        }
    }

    /// Run `op` as one operation of this engine.
    ///
    /// Returns `reentered()` without running `op` if the current task is
    /// already inside this engine.
    pub async fn run<T, E, F>(&self, op: F, reentered: impl FnOnce() -> E) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let entered = ENTERED.try_with(|entered| {
            let entered = entered.borrow();
            (
                entered.iter().any(|&(_, engine)| engine == self.engine),
                entered.iter().any(|&(domain, _)| domain == self.domain),
            )
        });

        match entered {
            Ok((true, _)) => {
                warn!(engine = self.engine, "Nested call into engine refused");
                Err(reentered())
            }
            Ok((false, true)) => {
                let _entry = Entry::push(self.domain, self.engine);
                op.await
            }
            Ok((false, false)) => {
                let _lock = self.lock.lock().await;
                let _entry = Entry::push(self.domain, self.engine);
                op.await
            }
            Err(_) => {
                let _lock = self.lock.lock().await;
                ENTERED
                    .scope(RefCell::new(vec![(self.domain, self.engine)]), op)
                    .await
            }
        }
    }
}

impl Default for OpGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the current task as inside an engine until dropped
struct Entry {
    domain: u64,
    engine: u64,
}

impl Entry {
    fn push(domain: u64, engine: u64) -> Self {
        let _ = ENTERED.try_with(|entered| entered.borrow_mut().push((domain, engine)));
        Self { domain, engine }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        let key = (self.domain, self.engine);
        let _ = ENTERED.try_with(|entered| {
            let mut entered = entered.borrow_mut();
            if let Some(pos) = entered.iter().rposition(|&e| e == key) {
                entered.remove(pos);
            }
        });
    }
}
