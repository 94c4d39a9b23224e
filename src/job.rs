use crate::error::RemoteError;
use crate::service::JobReference;
use std::time::{Duration, Instant};

/// Local view of a job: submitted → polling → complete | failed.
#[derive(Clone, Debug, PartialEq)]
pub enum JobState {
    Submitted,
    Polling,
    Complete,
    Failed(RemoteError),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed(_))
    }
}

/// One submitted query execution, owned by the caller.
#[derive(Clone, Debug)]
pub struct Job {
    reference: JobReference,
    state: JobState,
    polls: u32,
    submitted_at: Instant,
    finished_after: Option<Duration>,
}

impl Job {
    pub(crate) fn submitted(reference: JobReference) -> Self {
        Self { reference, state: JobState::Submitted, polls: 0, submitted_at: Instant::now(), finished_after: None }
    }

    pub fn reference(&self) -> &JobReference { &self.reference }
    pub fn id(&self) -> &str { &self.reference.job_id }
    pub fn state(&self) -> &JobState { &self.state }
    pub fn is_terminal(&self) -> bool { self.state.is_terminal() }
    pub fn is_complete(&self) -> bool { self.state == JobState::Complete }

    /// Number of status polls issued so far.
    pub fn polls(&self) -> u32 { self.polls }

    /// Wall time from submission until a terminal state was observed.
    pub fn elapsed(&self) -> Duration {
        self.finished_after.unwrap_or_else(|| self.submitted_at.elapsed())
    }

    pub(crate) fn record_poll(&mut self) {
        self.polls += 1;
        if self.state == JobState::Submitted {
            self.state = JobState::Polling;
        }
    }

    pub(crate) fn finish(&mut self, state: JobState) {
        debug_assert!(state.is_terminal());
        self.finished_after = Some(self.submitted_at.elapsed());
        self.state = state;
    }
}
