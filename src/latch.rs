use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::error::VgcError;

/// First-error-wins latch shared by every job of one test.
///
/// Once set, later errors are ignored and pending work observes the
/// cancellation.
#[derive(Debug, Clone, Default)]
pub struct ErrorLatch {
    inner: Arc<LatchInner>,
}

#[derive(Debug, Default)]
struct LatchInner {
    error: OnceLock<VgcError>,
    token: CancellationToken,
}

impl ErrorLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless another one got there first. Returns whether
    /// this call won.
    pub fn set(&self, error: VgcError) -> bool {
        let won = self.inner.error.set(error).is_ok();
        if won {
            self.inner.token.cancel();
        }
        won
    }

    pub fn get(&self) -> Option<VgcError> {
        self.inner.error.get().cloned()
    }

    pub fn is_set(&self) -> bool {
        self.inner.error.get().is_some()
    }

    /// Fail fast with the latched error, if any.
    pub fn check(&self) -> crate::Result<()> {
        match self.get() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Resolves once an error has been latched.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_error_wins() {
        let latch = ErrorLatch::new();
        assert!(latch.check().is_ok());

        assert!(latch.set(VgcError::Auth));
        assert!(!latch.set(VgcError::BadRequest));
        assert_eq!(latch.get(), Some(VgcError::Auth));
        assert_eq!(latch.check(), Err(VgcError::Auth));

        tokio::time::timeout(Duration::from_millis(100), latch.cancelled())
            .await
            .expect("latched error should cancel waiters");
    }
}
