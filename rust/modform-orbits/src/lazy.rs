//! Compute-once fields.
//!
//! A [`LazySlot`] holds a [`LazyField`] behind its own lock. The lock is held
//! for the whole computation, so concurrent callers wait for the first one
//! and then read the frozen result. `Computed` never changes again; `Failed`
//! only changes through an explicit [`LazySlot::reset_failed`].

use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// State of one lazily computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum LazyField<T> {
    Unset,
    Computed(T),
    Failed(String),
}

impl<T> LazyField<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, LazyField::Unset)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LazyField::Failed(_))
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            LazyField::Computed(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LazyField<U> {
        match self {
            LazyField::Unset => LazyField::Unset,
            LazyField::Computed(v) => LazyField::Computed(f(v)),
            LazyField::Failed(reason) => LazyField::Failed(reason),
        }
    }
}

#[derive(Debug)]
pub struct LazySlot<T> {
    name: &'static str,
    state: Mutex<LazyField<T>>,
}

impl<T: Clone> LazySlot<T> {
    pub fn new(name: &'static str) -> Self {
        LazySlot::from_state(name, LazyField::Unset)
    }

    pub fn from_state(name: &'static str, state: LazyField<T>) -> Self {
        LazySlot {
            name,
            state: Mutex::new(state),
        }
    }

    /// Frozen state, computing it first if the slot is unset.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> Result<T>) -> LazyField<T> {
        let mut state = self.state.lock();
        if state.is_unset() {
            *state = match compute() {
                Ok(value) => LazyField::Computed(value),
                Err(e) => {
                    log::warn!("{} not computed: {}", self.name, e);
                    LazyField::Failed(e.to_string())
                }
            };
        }
        state.clone()
    }

    /// Current state without computing anything.
    pub fn peek(&self) -> LazyField<T> {
        self.state.lock().clone()
    }

    /// Move a failed slot back to unset. Returns whether it was failed.
    pub fn reset_failed(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_failed() {
            *state = LazyField::Unset;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_computes_once() {
        let slot = LazySlot::new("answer");
        let runs = AtomicUsize::new(0);
        for _ in 0..3 {
            let state = slot.get_or_compute(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42u64)
            });
            assert_eq!(state, LazyField::Computed(42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_frozen_until_reset() {
        let slot: LazySlot<u64> = LazySlot::new("flaky");
        let state = slot.get_or_compute(|| Err(CacheError::Arithmetic("boom".to_string())));
        assert!(state.is_failed());
        // Not retried automatically.
        let state = slot.get_or_compute(|| Ok(1));
        assert!(state.is_failed());

        assert!(slot.reset_failed());
        assert_eq!(slot.get_or_compute(|| Ok(1)), LazyField::Computed(1));
        assert!(!slot.reset_failed(), "computed values cannot be reset");
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let slot = Arc::new(LazySlot::new("shared"));
        let runs = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let runs = Arc::clone(&runs);
                std::thread::spawn(move || {
                    slot.get_or_compute(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        Ok(7u32)
                    })
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), LazyField::Computed(7));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_serde_shape() {
        let field: LazyField<u32> = LazyField::Computed(3);
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, r#"{"state":"computed","value":3}"#);
        let unset: LazyField<u32> = serde_json::from_str(r#"{"state":"unset"}"#).unwrap();
        assert!(unset.is_unset());
    }
}
