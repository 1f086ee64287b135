//! # Concurrency hints
//!
//! The worker tells the sidecar how many orchestrator and activity work items
//! it is willing to have in flight at once. These values are advisory: the
//! sidecar uses them to pace delivery, but nothing on the worker side blocks
//! a dispatch when they are exceeded.
//!
//! ## Constants
//!
//! - [`DEFAULT_MAX_CONCURRENT_WORK_ITEMS`] - default orchestration hint
//! - [`DEFAULT_MAX_CONCURRENT_ACTIVITIES`] - default activity hint
//! - [`REGISTRY_PRUNE_FACTOR`] - how far the in-flight registry may grow,
//!   relative to the orchestration hint, before finished tasks are reaped

use crate::proto::GetWorkItemsRequest;
use crate::{Error, Result};

/// Default advisory limit on concurrently delivered orchestrator items.
pub const DEFAULT_MAX_CONCURRENT_WORK_ITEMS: i32 = 100;

/// Default advisory limit on concurrently delivered activity items.
pub const DEFAULT_MAX_CONCURRENT_ACTIVITIES: i32 = 100;

/// The in-flight registry is swept once it holds more than this many times
/// the orchestration hint.
pub const REGISTRY_PRUNE_FACTOR: usize = 2;

/// Validated, strictly positive concurrency hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyHints {
    max_concurrent_work_items: i32,
    max_concurrent_activities: i32,
}

impl ConcurrencyHints {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either value is not
    /// strictly positive.
    pub fn new(max_concurrent_work_items: i32, max_concurrent_activities: i32) -> Result<Self> {
        if max_concurrent_work_items <= 0 {
            return Err(Error::invalid_configuration(format!(
                "max concurrent work items must be greater than 0 (got {max_concurrent_work_items})"
            )));
        }
        if max_concurrent_activities <= 0 {
            return Err(Error::invalid_configuration(format!(
                "max concurrent activities must be greater than 0 (got {max_concurrent_activities})"
            )));
        }

        Ok(Self {
            max_concurrent_work_items,
            max_concurrent_activities,
        })
    }

    pub const fn max_concurrent_work_items(&self) -> i32 {
        self.max_concurrent_work_items
    }

    pub const fn max_concurrent_activities(&self) -> i32 {
        self.max_concurrent_activities
    }

    /// Registry size above which finished dispatch tasks are reaped.
    pub const fn prune_threshold(&self) -> usize {
        self.max_concurrent_work_items as usize * REGISTRY_PRUNE_FACTOR
    }

    /// The stream-open request advertising these hints to the sidecar.
    pub fn to_request(&self) -> GetWorkItemsRequest {
        GetWorkItemsRequest {
            max_concurrent_orchestration_work_items: self.max_concurrent_work_items,
            max_concurrent_activity_work_items: self.max_concurrent_activities,
            ..Default::default()
        }
    }
}

impl Default for ConcurrencyHints {
    fn default() -> Self {
        Self {
            max_concurrent_work_items: DEFAULT_MAX_CONCURRENT_WORK_ITEMS,
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
        }
    }
}
