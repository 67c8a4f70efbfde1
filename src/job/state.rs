use serde::{Deserialize, Serialize};

use super::model::JobStatus;

/// Data carried by a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPayload {
    /// No data; used for the `pending → running` claim.
    Empty,
    /// The two generated artifacts; required for `running → done`.
    Results { primary: String, secondary: String },
    /// Diagnostic text; required for `running → failed`.
    Failure { detail: String },
}

/// The complete field update a store applies when a transition is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub result_primary: Option<String>,
    pub result_secondary: Option<String>,
    pub failure_detail: Option<String>,
}

/// The job state machine.
///
/// ```text
/// pending ──claim──▶ running ──▶ done
///                        └─────▶ failed
/// ```
pub struct StateMachine;

impl StateMachine {
    /// Whether `from → to` is an edge of the state machine.
    pub fn allows(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Build the store update for `from → to`, or `None` when the edge is not
    /// allowed or the payload does not belong to the target status.
    pub fn plan(from: JobStatus, to: JobStatus, payload: TransitionPayload) -> Option<StatusUpdate> {
        if !Self::allows(from, to) {
            return None;
        }
        match (to, payload) {
            (JobStatus::Running, TransitionPayload::Empty) => Some(StatusUpdate {
                status: JobStatus::Running,
                result_primary: None,
                result_secondary: None,
                failure_detail: None,
            }),
            (JobStatus::Done, TransitionPayload::Results { primary, secondary }) => {
                Some(StatusUpdate {
                    status: JobStatus::Done,
                    result_primary: Some(primary),
                    result_secondary: Some(secondary),
                    failure_detail: None,
                })
            }
            (JobStatus::Failed, TransitionPayload::Failure { detail }) => Some(StatusUpdate {
                status: JobStatus::Failed,
                result_primary: None,
                result_secondary: None,
                failure_detail: Some(detail),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    #[test]
    fn only_forward_edges_are_allowed() {
        let mut allowed = Vec::new();
        for from in ALL {
            for to in ALL {
                if StateMachine::allows(from, to) {
                    allowed.push((from, to));
                }
            }
        }
        assert_eq!(
            allowed,
            vec![
                (JobStatus::Pending, JobStatus::Running),
                (JobStatus::Running, JobStatus::Done),
                (JobStatus::Running, JobStatus::Failed),
            ]
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for to in ALL {
            assert!(StateMachine::plan(JobStatus::Done, to, TransitionPayload::Empty).is_none());
            assert!(
                StateMachine::plan(
                    JobStatus::Failed,
                    to,
                    TransitionPayload::Failure { detail: "x".into() }
                )
                .is_none()
            );
        }
    }

    #[test]
    fn payload_must_match_target() {
        assert!(
            StateMachine::plan(JobStatus::Running, JobStatus::Done, TransitionPayload::Empty)
                .is_none()
        );
        assert!(
            StateMachine::plan(
                JobStatus::Pending,
                JobStatus::Running,
                TransitionPayload::Failure { detail: "x".into() }
            )
            .is_none()
        );

        let update = StateMachine::plan(
            JobStatus::Running,
            JobStatus::Done,
            TransitionPayload::Results {
                primary: "A".into(),
                secondary: "B".into(),
            },
        )
        .unwrap();
        assert_eq!(update.status, JobStatus::Done);
        assert_eq!(update.result_primary.as_deref(), Some("A"));
        assert_eq!(update.result_secondary.as_deref(), Some("B"));
        assert!(update.failure_detail.is_none());
    }

    #[test]
    fn failure_update_clears_results() {
        let update = StateMachine::plan(
            JobStatus::Running,
            JobStatus::Failed,
            TransitionPayload::Failure {
                detail: "transport error: timed out".into(),
            },
        )
        .unwrap();
        assert!(update.result_primary.is_none());
        assert_eq!(
            update.failure_detail.as_deref(),
            Some("transport error: timed out")
        );
    }
}
