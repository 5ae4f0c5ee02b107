//! Cooperative cancellation for long-running engine operations.
//!
//! The engine never spawns threads; callers that need responsiveness run
//! operations on a worker and trip the token from elsewhere. Operations
//! check the token at bounded intervals (particle descent in the graph
//! builder, each element emit in the generator, between pattern phases in
//! the Schematron compiler), so a cancel is observed within one unit of
//! work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation; observable from any clone of the token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_matches!(token.check(), Err(Cancelled));
    }
}
