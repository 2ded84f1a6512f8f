//! Request tokens used to fence overlapping asynchronous work.
//!
//! Every dispatched fetch gets a fresh token. The controller keeps the token
//! of the latest dispatch; a result is applied only when it still carries that
//! exact token (compared by identity) and the token was not cancelled.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Identity-compared handle for one in-flight request.
#[derive(Debug, Clone, Default)]
pub struct RequestToken(Arc<AtomicBool>);

impl RequestToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the request as superseded. Cooperative: the holder checks
    /// [`RequestToken::is_cancelled`] before applying anything.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when `other` was cloned from the same token.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True when this token is `current` and has not been cancelled.
    pub fn is_current(&self, current: Option<&Self>) -> bool {
        !self.is_cancelled() && current.is_some_and(|c| c.same_as(self))
    }
}

impl PartialEq for RequestToken {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for RequestToken {}
