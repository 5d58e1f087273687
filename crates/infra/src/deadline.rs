//! Per-call deadlines for cache, database, and downstream sub-operations.
//!
//! Every backend call an orchestrator makes goes through exactly one
//! [`Deadlines`] scope. A scope:
//!
//! - is derived from the inbound [`RequestContext`], never from an earlier
//!   scope of the same request;
//! - lasts `min(now + budget, inbound deadline)`;
//! - owns the wrapped future and drops it on every exit path (completion,
//!   timeout, error, or unwinding), which cancels the backend call.
//!
//! No retries happen here.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Which budget a scope draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Cache,
    Database,
    Downstream,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Cache => "cache",
            ScopeKind::Database => "database",
            ScopeKind::Downstream => "downstream",
        }
    }
}

impl core::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independently configured budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineConfig {
    pub cache: Duration,
    pub database: Duration,
    pub downstream: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            cache: Duration::from_secs(2),
            database: Duration::from_secs(5),
            downstream: Duration::from_secs(5),
        }
    }
}

impl DeadlineConfig {
    pub fn budget(&self, kind: ScopeKind) -> Duration {
        match kind {
            ScopeKind::Cache => self.cache,
            ScopeKind::Database => self.database,
            ScopeKind::Downstream => self.downstream,
        }
    }
}

/// Inbound request context. The transport may attach an absolute deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// No inbound deadline; only scope budgets apply.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind} call exceeded its deadline after {budget:?}")]
pub struct DeadlineExceeded {
    pub kind: ScopeKind,
    pub budget: Duration,
}

/// Outcome of a scoped fallible call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Scoped<E> {
    #[error(transparent)]
    Timeout(DeadlineExceeded),

    #[error(transparent)]
    Failed(E),
}

impl<E> Scoped<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Scoped::Timeout(_))
    }
}

/// The deadline coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadlines {
    config: DeadlineConfig,
}

impl Deadlines {
    pub fn new(config: DeadlineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeadlineConfig {
        &self.config
    }

    /// Run `fut` inside a fresh `kind` scope.
    ///
    /// An inbound deadline that already passed means `fut` is never polled.
    pub async fn run<F, T>(&self, ctx: &RequestContext, kind: ScopeKind, fut: F) -> Result<T, DeadlineExceeded>
    where
        F: Future<Output = T>,
    {
        let budget = self.config.budget(kind);
        let mut deadline = Instant::now() + budget;
        if let Some(inbound) = ctx.deadline() {
            deadline = deadline.min(inbound);
        }

        let exceeded = DeadlineExceeded { kind, budget };
        if deadline <= Instant::now() {
            warn!(scope = kind.as_str(), "inbound deadline already passed");
            return Err(exceeded);
        }

        tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
            warn!(scope = kind.as_str(), budget_ms = budget.as_millis() as u64, "deadline exceeded");
            exceeded
        })
    }

    /// Like [`Deadlines::run`] for fallible calls, keeping both failure modes.
    pub async fn try_run<F, T, E>(&self, ctx: &RequestContext, kind: ScopeKind, fut: F) -> Result<T, Scoped<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match self.run(ctx, kind, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Scoped::Failed(e)),
            Err(exceeded) => Err(Scoped::Timeout(exceeded)),
        }
    }

    pub async fn cache<F, T, E>(&self, ctx: &RequestContext, fut: F) -> Result<T, Scoped<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.try_run(ctx, ScopeKind::Cache, fut).await
    }

    pub async fn database<F, T, E>(&self, ctx: &RequestContext, fut: F) -> Result<T, Scoped<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.try_run(ctx, ScopeKind::Database, fut).await
    }

    pub async fn downstream<F, T, E>(&self, ctx: &RequestContext, fut: F) -> Result<T, Scoped<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.try_run(ctx, ScopeKind::Downstream, fut).await
    }
}
