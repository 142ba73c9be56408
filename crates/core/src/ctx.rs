//! Call context: cancellation plus an optional deadline, checked before every backend call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{O2Error, O2Result};

#[derive(Debug, Clone, Default)]
pub struct Ctx {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Ctx {
    /// Never canceled, no deadline.
    pub fn background() -> Self { Self::default() }

    pub fn with_token(cancel: CancellationToken) -> Self { Self { cancel, deadline: None } }

    /// Child context bounded by `timeout` (or the parent's deadline when that is sooner).
    /// Canceling the parent cancels the child; the reverse does not hold.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) if d < candidate => d,
            _ => candidate,
        };
        Self { cancel: self.cancel.child_token(), deadline: Some(deadline) }
    }

    pub fn cancel(&self) { self.cancel.cancel(); }

    pub fn token(&self) -> &CancellationToken { &self.cancel }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast when the context is already canceled or expired.
    pub fn check(&self, op: &str) -> O2Result<()> {
        if self.cancel.is_cancelled() {
            return Err(O2Error::Canceled(op.to_string()));
        }
        if let Some(d) = self.deadline {
            if Instant::now() >= d {
                return Err(O2Error::DeadlineExceeded(op.to_string()));
            }
        }
        Ok(())
    }

    /// Drive `fut` unless the context is canceled or its deadline passes first.
    pub async fn run<T, F>(&self, op: &str, fut: F) -> O2Result<T>
    where
        F: Future<Output = O2Result<T>>,
    {
        self.check(op)?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(O2Error::Canceled(op.to_string())),
            _ = deadline => Err(O2Error::DeadlineExceeded(op.to_string())),
            res = fut => res,
        }
    }

    /// Sleep for `d`, returning early with an error when the context ends.
    pub async fn sleep(&self, op: &str, d: Duration) -> O2Result<()> {
        self.run(op, async {
            tokio::time::sleep(d).await;
            Ok(())
        })
        .await
    }
}
