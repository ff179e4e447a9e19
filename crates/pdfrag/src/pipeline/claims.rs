//! Per-content-hash claims.
//!
//! A task holds the claim for its content hash from the dedup check until it
//! has either finished indexing or removed its partial row. A second task
//! with the same hash waits, then sees the settled outcome: the finished
//! document, or nothing at all.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Default)]
pub struct ContentClaims {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its hash on drop, including during a panic unwind.
#[must_use = "the claim is released when the guard is dropped"]
pub struct ClaimGuard<'a> {
    claims: &'a ContentClaims,
    hash: String,
}

impl ContentClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other task holds `hash`, then takes it.
    pub fn claim(&self, hash: &str) -> ClaimGuard<'_> {
        let mut held = self.lock();
        if held.contains(hash) {
            log::debug!("Waiting for in-flight ingestion of content {}", short(hash));
        }
        while held.contains(hash) {
            held = match self.released.wait(held) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        held.insert(hash.to_string());
        ClaimGuard {
            claims: self,
            hash: hash.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_claimed(&self, hash: &str) -> bool {
        self.lock().contains(hash)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.held.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Content claim lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.hash);
        self.claims.released.notify_all();
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
