// src/enrich/task.rs

use tracing::trace;

use crate::error::RowError;
use crate::extract::Extractor;
use crate::fetch::Fetcher;

/// Lifecycle of one row's enrichment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Fetching,
    Extracting,
    Merged,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Fetching => "fetching",
            TaskState::Extracting => "extracting",
            TaskState::Merged => "merged",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Merged | TaskState::Failed)
    }

    /// Allowed transitions: Pending → Fetching → Extracting → Merged, with
    /// Failed reachable from either working state.
    pub fn can_advance_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (*self, next),
            (Pending, Fetching)
                | (Fetching, Extracting)
                | (Fetching, Failed)
                | (Extracting, Merged)
                | (Extracting, Failed)
        )
    }
}

/// One data row's unit of work. `row` is the row's index in the table and is
/// the only key used when merging.
#[derive(Debug)]
pub struct EnrichmentTask {
    pub row: usize,
    pub entity: String,
    state: TaskState,
}

/// A task after its fetch/extract phase, waiting to be merged.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: EnrichmentTask,
    pub result: Result<String, RowError>,
}

impl EnrichmentTask {
    pub fn new(row: usize, entity: impl Into<String>) -> Self {
        Self {
            row,
            entity: entity.into(),
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        trace!(
            row = self.row,
            entity = %self.entity,
            from = self.state.as_str(),
            to = next.as_str(),
            "task state"
        );
        self.state = next;
    }

    /// Fetch then extract. Leaves the task in `Extracting` on success (merge
    /// completes it) or `Failed` otherwise.
    pub async fn run<F: Fetcher>(mut self, fetcher: &F, extractor: &Extractor) -> TaskOutcome {
        self.advance(TaskState::Fetching);
        let fetched = fetcher.fetch(&self.entity).await;
        let content = match fetched {
            Ok(content) => content,
            Err(e) => return self.fail(e.into()),
        };

        self.advance(TaskState::Extracting);
        let extracted = extractor.extract(&self.entity, &content);
        match extracted {
            Ok(metric) => TaskOutcome {
                task: self,
                result: Ok(metric),
            },
            Err(e) => self.fail(e.into()),
        }
    }

    fn fail(mut self, err: RowError) -> TaskOutcome {
        self.advance(TaskState::Failed);
        TaskOutcome {
            task: self,
            result: Err(err),
        }
    }
}
