use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use crate::core::error::{Error, ErrorKind, Result};

/// Cooperative cancellation shared between a caller and a running search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-query limits checked between node evaluations
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancellationToken>,
}

impl ExecutionContext {
    pub fn new(timeout: Option<Duration>, cancel: Option<CancellationToken>) -> Self {
        ExecutionContext {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::new(ErrorKind::Cancelled, "search cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::new(ErrorKind::EvaluationTimeout, "deadline elapsed".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_wins_over_deadline() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new(Some(Duration::ZERO), Some(token.clone()));
        assert_eq!(ctx.check().unwrap_err().kind, ErrorKind::EvaluationTimeout);

        token.cancel();
        assert_eq!(ctx.check().unwrap_err().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_unbounded_context_passes() {
        assert!(ExecutionContext::default().check().is_ok());
    }
}
