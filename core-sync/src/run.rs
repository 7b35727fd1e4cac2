//! # Sync Run State Machine
//!
//! Tracks one multi-entity sync run with validated state transitions.
//!
//! ## State Machine
//!
//! ```text
//! NotStarted → OccurrenceSynced → PlotSynced → PlotOccurrenceSynced → Committed
//!     ↓               ↓               ↓                ↓
//!     └───────────────┴───────────────┴────────────────┴──→ Failed
//! ```
//!
//! Occurrence and plot phases must complete — even when skipped by
//! configuration — before the plot/occurrence phase begins, because
//! association rows reference canonical ids assigned during the earlier
//! phases. The orchestrator advances the run through every state in order;
//! skipping a state is an invalid transition.

use crate::{Result, SyncError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The phase a sync run has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    NotStarted,
    OccurrenceSynced,
    PlotSynced,
    PlotOccurrenceSynced,
    Committed,
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Committed | SyncState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::NotStarted => "not_started",
            SyncState::OccurrenceSynced => "occurrence_synced",
            SyncState::PlotSynced => "plot_synced",
            SyncState::PlotOccurrenceSynced => "plot_occurrence_synced",
            SyncState::Committed => "committed",
            SyncState::Failed => "failed",
        }
    }
}

impl FromStr for SyncState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(SyncState::NotStarted),
            "occurrence_synced" => Ok(SyncState::OccurrenceSynced),
            "plot_synced" => Ok(SyncState::PlotSynced),
            "plot_occurrence_synced" => Ok(SyncState::PlotOccurrenceSynced),
            "committed" => Ok(SyncState::Committed),
            "failed" => Ok(SyncState::Failed),
            _ => Err(SyncError::InvalidStateTransition {
                from: "unknown".to_string(),
                to: s.to_string(),
                reason: "unknown sync state".to_string(),
            }),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One multi-entity sync run for a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub provider_id: i64,
    pub state: SyncState,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(provider_id: i64) -> Self {
        Self {
            id: SyncRunId::new(),
            provider_id,
            state: SyncState::NotStarted,
            started_at: Utc::now().timestamp(),
            finished_at: None,
            error_message: None,
        }
    }

    /// Advance to the next state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless `to` immediately follows the
    /// current state in the phase order.
    pub fn advance(&mut self, to: SyncState) -> Result<()> {
        let valid = matches!(
            (self.state, to),
            (SyncState::NotStarted, SyncState::OccurrenceSynced)
                | (SyncState::OccurrenceSynced, SyncState::PlotSynced)
                | (SyncState::PlotSynced, SyncState::PlotOccurrenceSynced)
                | (SyncState::PlotOccurrenceSynced, SyncState::Committed)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("cannot advance from {} to {}", self.state, to),
            });
        }

        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now().timestamp());
        }
        Ok(())
    }

    /// Mark the run as failed. Valid from every non-terminal state.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.state.is_terminal() {
            self.state = SyncState::Failed;
            self.finished_at = Some(Utc::now().timestamp());
            self.error_message = Some(message.into());
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(SyncRunId::new(), SyncRunId::new());
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            SyncState::NotStarted,
            SyncState::OccurrenceSynced,
            SyncState::PlotSynced,
            SyncState::PlotOccurrenceSynced,
            SyncState::Committed,
            SyncState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
    }

    #[test]
    fn test_full_phase_order() {
        let mut run = SyncRun::new(1);
        assert_eq!(run.state, SyncState::NotStarted);

        run.advance(SyncState::OccurrenceSynced).unwrap();
        run.advance(SyncState::PlotSynced).unwrap();
        run.advance(SyncState::PlotOccurrenceSynced).unwrap();
        run.advance(SyncState::Committed).unwrap();

        assert_eq!(run.state, SyncState::Committed);
        assert!(run.finished_at.is_some());
        assert!(run.duration_secs().is_some());
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut run = SyncRun::new(1);

        // Plot sync cannot begin before occurrence sync completed.
        assert!(run.advance(SyncState::PlotSynced).is_err());
        // Plot/occurrence sync cannot begin before both earlier phases.
        assert!(run.advance(SyncState::PlotOccurrenceSynced).is_err());
        // Cannot commit an unstarted run.
        assert!(run.advance(SyncState::Committed).is_err());
    }

    #[test]
    fn test_fail_from_any_non_terminal_state() {
        for advance_to in [
            None,
            Some(SyncState::OccurrenceSynced),
            Some(SyncState::PlotSynced),
        ] {
            let mut run = SyncRun::new(1);
            if let Some(state) = advance_to {
                run.advance(SyncState::OccurrenceSynced).ok();
                if state != SyncState::OccurrenceSynced {
                    run.advance(state).unwrap();
                }
            }
            run.fail("boom");
            assert_eq!(run.state, SyncState::Failed);
            assert_eq!(run.error_message.as_deref(), Some("boom"));
        }
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let mut run = SyncRun::new(1);
        run.advance(SyncState::OccurrenceSynced).unwrap();
        run.advance(SyncState::PlotSynced).unwrap();
        run.advance(SyncState::PlotOccurrenceSynced).unwrap();
        run.advance(SyncState::Committed).unwrap();

        assert!(run.advance(SyncState::OccurrenceSynced).is_err());

        let finished_at = run.finished_at;
        run.fail("late failure is ignored");
        assert_eq!(run.state, SyncState::Committed);
        assert_eq!(run.finished_at, finished_at);
    }
}
