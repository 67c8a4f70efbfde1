use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted display name for a job.
pub const MAX_NAME_LEN: usize = 100;

/// Opaque, immutable job identifier. On the queue wire it travels as its
/// hyphenated UTF-8 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle status of a job.
///
/// `Pending → Running → {Done | Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Caller input is unusable as submitted. Not retryable without changing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("owner id must not be empty")]
    MissingOwner,
    #[error("analysis goal must not be empty")]
    MissingGoal,
    #[error("raw data must not be empty")]
    MissingData,
    #[error("job name is longer than {MAX_NAME_LEN} characters")]
    NameTooLong,
    #[error("{0}")]
    Other(String),
}

/// What a caller submits: the stated goal and the tabular data to analyse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(default)]
    pub name: Option<String>,
    pub goal: String,
    #[serde(default)]
    pub chart_type_hint: Option<String>,
    pub raw_data: String,
}

impl JobInput {
    pub fn new(goal: impl Into<String>, raw_data: impl Into<String>) -> Self {
        Self {
            name: None,
            goal: goal.into(),
            chart_type_hint: None,
            raw_data: raw_data.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_chart_type(mut self, hint: impl Into<String>) -> Self {
        self.chart_type_hint = Some(hint.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.goal.trim().is_empty() {
            return Err(ValidationError::MissingGoal);
        }
        if self.raw_data.trim().is_empty() {
            return Err(ValidationError::MissingData);
        }
        if let Some(name) = &self.name
            && name.chars().count() > MAX_NAME_LEN
        {
            return Err(ValidationError::NameTooLong);
        }
        Ok(())
    }
}

/// A validated submission bound to its owner, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub owner_id: String,
    pub input: JobInput,
}

impl NewJob {
    pub fn new(owner_id: impl Into<String>, input: JobInput) -> Result<Self, ValidationError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(ValidationError::MissingOwner);
        }
        input.validate()?;
        Ok(Self { owner_id, input })
    }
}

/// The persisted unit of work.
///
/// `result_primary`/`result_secondary` are set only together with
/// [`JobStatus::Done`]; `failure_detail` only with [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: String,
    pub name: Option<String>,
    pub goal: String,
    pub chart_type_hint: Option<String>,
    pub raw_data: String,
    pub status: JobStatus,
    pub result_primary: Option<String>,
    pub result_secondary: Option<String>,
    pub failure_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn from_new(new: NewJob) -> Self {
        let now = Utc::now();
        let NewJob { owner_id, input } = new;
        Self {
            id: JobId::new(),
            owner_id,
            name: input.name,
            goal: input.goal,
            chart_type_hint: input.chart_type_hint,
            raw_data: input.raw_data,
            status: JobStatus::Pending,
            result_primary: None,
            result_secondary: None,
            failure_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the result/failure fields agree with `status`.
    pub fn is_consistent(&self) -> bool {
        let has_results = self.result_primary.is_some() && self.result_secondary.is_some();
        let no_results = self.result_primary.is_none() && self.result_secondary.is_none();
        match self.status {
            JobStatus::Done => has_results && self.failure_detail.is_none(),
            JobStatus::Failed => no_results && self.failure_detail.is_some(),
            JobStatus::Pending | JobStatus::Running => no_results && self.failure_detail.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> JobInput {
        JobInput::new("compare sales", "month,sales\nJan,10\nFeb,20")
    }

    #[test]
    fn new_job_starts_pending_and_consistent() {
        let job = Job::from_new(NewJob::new("u1", input()).unwrap());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.owner_id, "u1");
        assert!(job.result_primary.is_none());
        assert!(job.is_consistent());
    }

    #[test]
    fn validation_rejects_blank_fields() {
        assert_eq!(
            NewJob::new("  ", input()).unwrap_err(),
            ValidationError::MissingOwner
        );
        assert_eq!(
            NewJob::new("u1", JobInput::new(" ", "a,b")).unwrap_err(),
            ValidationError::MissingGoal
        );
        assert_eq!(
            NewJob::new("u1", JobInput::new("goal", "\n")).unwrap_err(),
            ValidationError::MissingData
        );
    }

    #[test]
    fn validation_limits_name_length() {
        let ok = input().with_name("x".repeat(MAX_NAME_LEN));
        assert!(ok.validate().is_ok());

        let too_long = input().with_name("x".repeat(MAX_NAME_LEN + 1));
        assert_eq!(too_long.validate().unwrap_err(), ValidationError::NameTooLong);
    }

    #[test]
    fn job_id_parses_its_own_display() {
        let id = JobId::new();
        let parsed: JobId = format!(" {id}\n").parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-job".parse::<JobId>().is_err());
    }

    #[test]
    fn status_display_and_terminality() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Done.to_string(), "done");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_serializes_status_lowercase() {
        let job = Job::from_new(NewJob::new("u1", input()).unwrap());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "pending");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, job.id);
    }
}
