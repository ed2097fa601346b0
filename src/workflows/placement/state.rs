//! Lifecycle state machine for placement applications.
//!
//! Pure, table-driven, no I/O. Transitions not listed in the table are
//! illegal; a missing entry means "not allowed", never a permissive default.
//!
//! ```text
//! PendingAuthorization -> AuthorizationReceived -> VisaProcessing -> VisaReceived
//!     -> WorkerArrived -> LabourPermitProcessing -> ResidencyPermitProcessing
//!     -> ActiveEmployment -> { ContractEnded | RenewalPending <-> ActiveEmployment }
//!
//! pre-arrival states  -> CancelledPreArrival
//! post-arrival states -> CancelledPostArrival | CancelledByCandidate
//! ```

use chrono::{Months, NaiveDate};

use super::domain::{ApplicationStatus, CandidateStatus};

use ApplicationStatus::*;

/// Outcome of a transition legality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCheck {
    pub allowed: bool,
    /// Human-readable denial reason when `allowed` is false.
    pub reason: Option<String>,
}

impl TransitionCheck {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Every legal move out of `from`. Exhaustive over the status enum so a new
/// state cannot be added without deciding its outgoing edges.
pub fn valid_next_states(from: ApplicationStatus) -> &'static [ApplicationStatus] {
    match from {
        PendingAuthorization => &[AuthorizationReceived, CancelledPreArrival],
        AuthorizationReceived => &[VisaProcessing, CancelledPreArrival],
        VisaProcessing => &[VisaReceived, CancelledPreArrival],
        VisaReceived => &[WorkerArrived, CancelledPreArrival],
        WorkerArrived => &[
            LabourPermitProcessing,
            CancelledPostArrival,
            CancelledByCandidate,
        ],
        LabourPermitProcessing => &[
            ResidencyPermitProcessing,
            CancelledPostArrival,
            CancelledByCandidate,
        ],
        ResidencyPermitProcessing => &[
            ActiveEmployment,
            CancelledPostArrival,
            CancelledByCandidate,
        ],
        ActiveEmployment => &[
            ContractEnded,
            RenewalPending,
            CancelledPostArrival,
            CancelledByCandidate,
        ],
        RenewalPending => &[
            ActiveEmployment,
            ContractEnded,
            CancelledPostArrival,
            CancelledByCandidate,
        ],
        ContractEnded | CancelledPreArrival | CancelledPostArrival | CancelledByCandidate => &[],
    }
}

/// Checks whether `from -> to` appears in the transition table.
pub fn check_transition(from: ApplicationStatus, to: ApplicationStatus) -> TransitionCheck {
    if is_terminal(from) {
        return TransitionCheck::denied(format!(
            "application is in terminal state {from} and cannot change status"
        ));
    }
    if valid_next_states(from).contains(&to) {
        TransitionCheck::allowed()
    } else {
        TransitionCheck::denied(format!("transition {from} -> {to} is not allowed"))
    }
}

/// The single side-conditioned transition: arriving requires a recorded
/// exact arrival date.
pub fn requires_exact_arrival_date(to: ApplicationStatus) -> bool {
    to == WorkerArrived
}

/// Candidate status implied by an application transition, if any. The
/// orchestrator applies this; callers never set candidate status directly.
pub fn candidate_status_change(
    _from: ApplicationStatus,
    to: ApplicationStatus,
) -> Option<CandidateStatus> {
    match to {
        WorkerArrived => Some(CandidateStatus::InProcess),
        ActiveEmployment => Some(CandidateStatus::Placed),
        ContractEnded => Some(CandidateStatus::AvailableInLebanon),
        CancelledPreArrival => Some(CandidateStatus::AvailableAbroad),
        CancelledPostArrival | CancelledByCandidate => Some(CandidateStatus::AvailableInLebanon),
        _ => None,
    }
}

/// Whether the status is terminal: contract ended or any cancellation.
pub fn is_terminal(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ContractEnded | CancelledPreArrival | CancelledPostArrival | CancelledByCandidate
    )
}

/// A non-terminal application is considered active.
pub fn is_active(status: ApplicationStatus) -> bool {
    !is_terminal(status)
}

/// Whether any cancellation state is reachable from `status`.
pub fn is_cancellable(status: ApplicationStatus) -> bool {
    valid_next_states(status).iter().any(|next| {
        matches!(
            next,
            CancelledPreArrival | CancelledPostArrival | CancelledByCandidate
        )
    })
}

/// Whether the status sits before the worker's arrival.
pub fn is_pre_arrival(status: ApplicationStatus) -> bool {
    matches!(
        status,
        PendingAuthorization | AuthorizationReceived | VisaProcessing | VisaReceived
    )
}

/// Whether the status sits after arrival but before a terminal state.
pub fn is_post_arrival(status: ApplicationStatus) -> bool {
    matches!(
        status,
        WorkerArrived
            | LabourPermitProcessing
            | ResidencyPermitProcessing
            | ActiveEmployment
            | RenewalPending
    )
}

/// End of the probation window: arrival date plus three calendar months.
pub fn probation_end(arrival: NaiveDate) -> NaiveDate {
    arrival
        .checked_add_months(Months::new(3))
        .unwrap_or(NaiveDate::MAX)
}

/// Whether `today` still falls inside the probation window for `arrival`.
pub fn within_probation(arrival: NaiveDate, today: NaiveDate) -> bool {
    today <= probation_end(arrival)
}
