use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use shared::domain::{ProgramStatus, TrainingProgram};
use tracing::debug;

use crate::search::{filter_records, SearchFilter};

/// Delay of the program search in the create dialogs.
pub const PROGRAM_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Trailing-edge debounce: of several calls to [`Debouncer::settle`] made
/// within `delay` of each other, only the last one resolves to `true`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits out the delay and reports whether this call is still the latest.
    pub async fn settle(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == ticket
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(PROGRAM_SEARCH_DEBOUNCE)
    }
}

/// Program lookup used when linking a request or a unit to a program.
#[derive(Debug, Default)]
pub struct ProgramPicker {
    debouncer: Debouncer,
}

impl ProgramPicker {
    pub fn new(delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
        }
    }

    /// Every matching program, or `None` when a newer query superseded this
    /// one while it was waiting.
    pub async fn query<'a>(
        &self,
        programs: &'a [TrainingProgram],
        query: &str,
    ) -> Option<Vec<&'a TrainingProgram>> {
        if !self.debouncer.settle().await {
            debug!("program picker: dropped superseded query {query:?}");
            return None;
        }
        let filter: SearchFilter<ProgramStatus> = SearchFilter::with_query(query);
        Some(filter_records(programs, &filter))
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
