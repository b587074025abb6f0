//! Check-in state machine.
//!
//! Tracks where the current scan is in the check-in flow and rejects
//! transitions the flow never makes, so a bug in the pipeline shows up as an
//! `InvalidStateTransition` error instead of a silently skipped step.
//!
//! # States
//!
//! - `Idle`: waiting for an admitted scan
//! - `Validating`: asking the registration API about the identifier
//! - `CheckingIn`: recording the check-in (skipped for reprints)
//! - `Printing`: submitting, printing directly or simulating the badge
//! - `Done`: the run succeeded
//! - `Error`: the run failed
//!
//! # Valid Transitions
//!
//! - Idle → Validating → CheckingIn → Printing → Done → Idle
//! - Validating → Printing (reprint of an already checked-in visitor)
//! - Validating/CheckingIn → Done (printing disabled)
//! - Any in-progress state → Error → Idle
//!
//! # Examples
//!
//! ```
//! use kiosk_checkin::{CheckInState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! machine.transition_to(CheckInState::Validating).unwrap();
//! machine.transition_to(CheckInState::CheckingIn).unwrap();
//!
//! // A check-in can never go back to validation.
//! assert!(machine.transition_to(CheckInState::Validating).is_err());
//! assert_eq!(machine.current_state(), &CheckInState::CheckingIn);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use kiosk_core::{Error, Result};

/// Maximum number of state transitions to keep in history.
///
/// A full run is four or five transitions, so this covers the last
/// twenty or so scans.
const MAX_HISTORY_SIZE: usize = 100;

/// Phase of the check-in flow for the scan currently in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInState {
    /// No scan in the pipeline.
    Idle,

    /// Validating the identifier with the registration API.
    Validating,

    /// Recording the check-in.
    CheckingIn,

    /// Producing the badge.
    Printing,

    /// Run finished successfully.
    Done,

    /// Run failed.
    Error,
}

impl fmt::Display for CheckInState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            CheckInState::Idle => "Idle",
            CheckInState::Validating => "Validating",
            CheckInState::CheckingIn => "CheckingIn",
            CheckInState::Printing => "Printing",
            CheckInState::Done => "Done",
            CheckInState::Error => "Error",
        };
        write!(f, "{}", state_str)
    }
}

impl CheckInState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_checkin::CheckInState;
    ///
    /// assert!(CheckInState::Validating.can_transition_to(&CheckInState::Printing));
    /// assert!(!CheckInState::Idle.can_transition_to(&CheckInState::Printing));
    /// ```
    pub fn can_transition_to(&self, target: &CheckInState) -> bool {
        matches!(
            (self, target),
            // From Idle
            (CheckInState::Idle, CheckInState::Validating | CheckInState::Error)
            // From Validating
            | (
                CheckInState::Validating,
                CheckInState::CheckingIn
                    | CheckInState::Printing
                    | CheckInState::Done
                    | CheckInState::Error
            )
            // From CheckingIn
            | (
                CheckInState::CheckingIn,
                CheckInState::Printing | CheckInState::Done | CheckInState::Error
            )
            // From Printing
            | (CheckInState::Printing, CheckInState::Done | CheckInState::Error)
            // Terminal states
            | (CheckInState::Done | CheckInState::Error, CheckInState::Idle)
        )
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckInState::Done | CheckInState::Error)
    }
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CheckInState,
    pub to: CheckInState,

    /// Not serialized; set to the deserialization time when read back.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: CheckInState, to: CheckInState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time elapsed since the transition.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State machine for the check-in flow of one kiosk.
///
/// Not thread-safe by itself; the pipeline keeps it behind a mutex and
/// never holds the lock across an await point.
///
/// # Examples
///
/// ```
/// use kiosk_checkin::{CheckInState, StateMachine};
///
/// let mut machine = StateMachine::new();
/// machine.transition_to(CheckInState::Validating).unwrap();
/// machine.transition_to(CheckInState::Printing).unwrap();
/// machine.transition_to(CheckInState::Done).unwrap();
///
/// assert_eq!(machine.history().len(), 3);
/// ```
#[derive(Debug)]
pub struct StateMachine {
    current_state: CheckInState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: CheckInState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> &CheckInState {
        &self.current_state
    }

    /// Time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the flow never moves from
    /// the current state to `new_state`. The state is left unchanged.
    pub fn transition_to(&mut self, new_state: CheckInState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine back to Idle regardless of the current state.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, CheckInState::Idle);
        self.perform_state_change(CheckInState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: CheckInState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();

        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
