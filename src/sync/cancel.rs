use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, DubsyncError};

/// Job-level cancellation flag, cheap to clone and share across workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if cancellation was requested
    pub fn checkpoint(&self, phase: &'static str, completed: usize, total: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(DubsyncError::Cancelled {
                phase,
                completed,
                total,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(worker.checkpoint("normalize", 0, 3).is_ok());

        token.cancel();
        assert!(worker.is_cancelled());
        match worker.checkpoint("assemble", 2, 3) {
            Err(DubsyncError::Cancelled { phase, completed, total }) => {
                assert_eq!(phase, "assemble");
                assert_eq!((completed, total), (2, 3));
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }
}
