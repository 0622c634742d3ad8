use std::fmt::Debug;

use super::{BisectOutcome, BisectRequest};
use crate::error::ResolveError;

/// Narrows a build range to the change that introduced or fixed a crash.
#[async_trait::async_trait]
pub trait Bisector: Send + Sync + Debug {
    /// Run a bisection. An `Err` means the search could not be set up at all
    /// (for example an endpoint that resolves to no build); a search that ran
    /// but did not converge is reported through [`BisectOutcome::status`].
    async fn bisect(&self, request: &BisectRequest) -> Result<BisectOutcome, ResolveError>;
}
