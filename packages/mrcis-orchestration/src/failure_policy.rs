//! Failure policy (§4.H step 9): decides whether a failed file gets
//! retried or permanently failed, isolated from the pipeline so the
//! `failure_count` threshold is unit-testable on its own.

use mrcis_core::model::FileStatus;

#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    max_retries: u32,
}

impl FailurePolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// `failure_count` is the count *after* the current failure is
    /// applied. Once it reaches `max_retries` the file is permanently
    /// failed; below that it's retried.
    pub fn determine_action(&self, failure_count: u32) -> (bool, FileStatus) {
        if failure_count >= self.max_retries {
            (false, FileStatus::PermanentFailure)
        } else {
            (true, FileStatus::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_below_threshold() {
        let policy = FailurePolicy::new(3);
        assert_eq!(policy.determine_action(0), (true, FileStatus::Failed));
        assert_eq!(policy.determine_action(2), (true, FileStatus::Failed));
    }

    #[test]
    fn stops_retrying_at_threshold() {
        let policy = FailurePolicy::new(3);
        assert_eq!(policy.determine_action(3), (false, FileStatus::PermanentFailure));
        assert_eq!(policy.determine_action(5), (false, FileStatus::PermanentFailure));
    }

    #[test]
    fn max_retries_zero_never_retries() {
        let policy = FailurePolicy::new(0);
        assert_eq!(policy.determine_action(0), (false, FileStatus::PermanentFailure));
    }

    #[test]
    fn max_retries_one_allows_a_single_retry() {
        let policy = FailurePolicy::new(1);
        assert_eq!(policy.determine_action(0), (true, FileStatus::Failed));
        assert_eq!(policy.determine_action(1), (false, FileStatus::PermanentFailure));
    }
}
