//! Per-cell fetch state.

use std::fmt;

use tracing::trace;

use crate::geometry::Bounds;

/// Lifecycle of one sub-region fetch.
///
/// ```text
/// Pending → FetchingPage ⇄ RetryWait
///               │
///               ▼
///           Received ──(cursor)──► FetchingPage
///               │
///               ▼
///             Done            FetchingPage ──(retries exhausted)──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Pending,
    FetchingPage,
    Received,
    RetryWait,
    Done,
    Failed,
}

impl CellState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CellState::Done | CellState::Failed)
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CellState::Pending => "pending",
            CellState::FetchingPage => "fetching_page",
            CellState::Received => "received",
            CellState::RetryWait => "retry_wait",
            CellState::Done => "done",
            CellState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of fetching one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellReport {
    /// Position in the subdivision grid.
    pub index: usize,
    /// Cell bounds (WGS84).
    pub bounds: Bounds,
    /// Current or final state.
    pub state: CellState,
    /// Every state the cell passed through, in order.
    pub history: Vec<CellState>,
    /// Pages successfully received.
    pub pages: usize,
    /// Records appended to the store.
    pub accepted: usize,
    /// Items whose id was already known.
    pub duplicates: usize,
    /// Items that failed validation.
    pub rejected: usize,
    /// Items skipped by the device filter.
    pub filtered_out: usize,
    /// Requests issued, including retries.
    pub attempts: u32,
    /// Final error for failed cells.
    pub error: Option<String>,
}

impl CellReport {
    pub fn new(index: usize, bounds: Bounds) -> Self {
        Self {
            index,
            bounds,
            state: CellState::Pending,
            history: vec![CellState::Pending],
            pages: 0,
            accepted: 0,
            duplicates: 0,
            rejected: 0,
            filtered_out: 0,
            attempts: 0,
            error: None,
        }
    }

    /// Moves to a new state and records it.
    pub fn transition(&mut self, state: CellState) {
        trace!(cell = self.index, from = %self.state, to = %state, "Cell transition");
        self.state = state;
        self.history.push(state);
    }

    /// Marks the cell failed with an error message.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.error = Some(error.to_string());
        self.transition(CellState::Failed);
    }

    pub fn is_failed(&self) -> bool {
        self.state == CellState::Failed
    }
}
