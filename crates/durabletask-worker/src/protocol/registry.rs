use tokio::task::JoinSet;

/// Outstanding dispatch tasks, owned by the receive loop.
///
/// Spawning never waits on earlier tasks. Once the set grows past the prune
/// threshold, finished tasks are reaped; unfinished ones stay and are joined
/// by [`InFlight::drain`] when the loop exits.
#[derive(Debug)]
pub(crate) struct InFlight {
    tasks: JoinSet<()>,
    prune_threshold: usize,
}

impl InFlight {
    pub(crate) fn new(prune_threshold: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            prune_threshold,
        }
    }

    /// Spawns a dispatch and sweeps the set if it is over the threshold.
    pub(crate) fn spawn<F>(&mut self, dispatch: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(dispatch);
        if self.tasks.len() > self.prune_threshold {
            self.prune();
        }
    }

    /// Reaps every task that has already finished.
    ///
    /// Returns the number of tasks removed.
    pub(crate) fn prune(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(joined) = self.tasks.try_join_next() {
            log_join_error(joined);
            reaped += 1;
        }
        if reaped > 0 {
            tracing::trace!(reaped, remaining = self.tasks.len(), "Pruned in-flight registry");
        }
        reaped
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every outstanding dispatch to reach a terminal outcome.
    pub(crate) async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            log_join_error(joined);
        }
    }
}

// Dispatches contain handler panics themselves, so a join error here means
// the dispatcher itself failed.
fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Dispatch task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn sweeps_finished_tasks_past_threshold() {
        let mut registry = InFlight::new(4);
        for _ in 0..4 {
            registry.spawn(async {});
        }
        // Let the trivial tasks finish before the fifth spawn triggers a sweep.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        registry.spawn(async {});
        assert!(registry.len() <= 4);
    }

    #[tokio::test]
    async fn unfinished_tasks_survive_pruning() {
        let gate = CancellationToken::new();
        let mut registry = InFlight::new(1);
        for _ in 0..3 {
            let gate = gate.clone();
            registry.spawn(async move { gate.cancelled().await });
        }
        assert_eq!(registry.prune(), 0);
        assert_eq!(registry.len(), 3);
        gate.cancel();
        registry.drain().await;
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn drain_joins_everything() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut registry = InFlight::new(100);
        for i in 0..10 {
            let done = done.clone();
            registry.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        registry.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }
}
