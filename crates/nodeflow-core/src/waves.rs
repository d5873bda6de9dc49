//! Ordered execution of a batch of work items, sequentially or in waves.
use std::future::Future;

use futures::future::join_all;
use tracing::debug;

use crate::error::FlowResult;

/// How a batch construct dispatches its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrency {
    /// One item at a time, in input order.
    Sequential,
    /// Waves of at most `max_concurrency` in-flight items; 0 means the whole
    /// batch is one wave.
    Parallel { max_concurrency: usize },
}

impl Concurrency {
    pub fn parallel(max_concurrency: usize) -> Self {
        Self::Parallel { max_concurrency }
    }

    fn wave_size(&self, total: usize) -> usize {
        match *self {
            Concurrency::Sequential => 1,
            Concurrency::Parallel { max_concurrency: 0 } => total.max(1),
            Concurrency::Parallel { max_concurrency } => max_concurrency,
        }
    }
}

/// Run `f(index, item)` for every item and collect results in input order.
///
/// Sequential mode stops at the first failure. Parallel mode launches every
/// item of a wave before awaiting any of them, lets the whole wave settle,
/// and only then reports the first failure in input order or starts the
/// next wave. All futures are polled on the calling task.
pub async fn run_ordered<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: Concurrency,
    f: F,
) -> FlowResult<Vec<R>>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = FlowResult<R>>,
{
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    if concurrency == Concurrency::Sequential {
        for (index, item) in items.into_iter().enumerate() {
            results.push(f(index, item).await?);
        }
        return Ok(results);
    }

    let wave_size = concurrency.wave_size(total);
    let mut pending = items.into_iter().enumerate().peekable();
    let mut wave = 0;
    while pending.peek().is_some() {
        let in_flight: Vec<Fut> = pending
            .by_ref()
            .take(wave_size)
            .map(|(index, item)| f(index, item))
            .collect();
        debug!(wave, size = in_flight.len(), total, "dispatching wave");
        for settled in join_all(in_flight).await {
            results.push(settled?);
        }
        wave += 1;
    }
    Ok(results)
}
