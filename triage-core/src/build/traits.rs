use std::fmt::Debug;

use super::{BuildLease, BuildQuery, BuildRef, TargetKind};
use crate::error::{BuildError, ResolveError};

/// Maps a (branch, build, flags, target, platform) query to a concrete build.
#[async_trait::async_trait]
pub trait BuildResolver: Send + Sync + Debug {
    /// Resolve a query to a downloadable build.
    async fn resolve(&self, query: &BuildQuery) -> Result<BuildRef, ResolveError>;

    /// Resolve a long-term-support alias (`esr-next`, `esr-stable`) to the
    /// branch it currently points at (`esr115`), or `None` when that track
    /// does not exist right now.
    async fn resolve_esr(&self, alias: &str) -> Result<Option<String>, ResolveError>;
}

/// Obtains a local copy of a resolved build.
#[async_trait::async_trait]
pub trait BuildManager: Send + Sync + Debug {
    /// Download (or reuse) the build and return a lease on its local path.
    /// The build stays available until the lease is dropped.
    async fn acquire(&self, build: &BuildRef, target: TargetKind)
    -> Result<BuildLease, BuildError>;
}
