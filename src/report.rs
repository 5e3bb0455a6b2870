//! Run-wide counters and the final status line (spec.md §4.7, §9). The
//! source tracks `__PAIR_COUNT`/`__PAIR_SKIP_COUNT`/`__DATASET_COUNT`/
//! `__DATASET_SKIP_COUNT` as process-wide shell integers; here they are
//! fields of a value threaded through the engine and driver instead,
//! exactly as spec.md §9's Design Notes prescribe.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "SUCCESS"),
            Status::Warning => write!(f, "WARNING"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunReport {
    pub pair_count: u32,
    pub pair_skip_count: u32,
    pub dataset_count: u32,
    pub dataset_skip_count: u32,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair_attempted(&mut self) {
        self.pair_count += 1;
    }

    pub fn pair_skipped(&mut self) {
        self.pair_skip_count += 1;
    }

    pub fn dataset_attempted(&mut self) {
        self.dataset_count += 1;
    }

    pub fn dataset_skipped(&mut self) {
        self.dataset_skip_count += 1;
    }

    /// `SUCCESS` when nothing was skipped, `WARNING` when something was —
    /// the caller upgrades this to `ERROR` itself when the run as a whole
    /// exits non-zero (lock held, signal, missing config), since those
    /// paths never reach a `RunReport` at all (spec.md §4.7).
    pub fn status(&self) -> Status {
        if self.pair_skip_count > 0 || self.dataset_skip_count > 0 {
            Status::Warning
        } else {
            Status::Success
        }
    }

    /// `<STATUS>: total sets=N skipped=n total datasets=M skipped=m`
    pub fn summary_line(&self) -> String {
        format!(
            "{}: total sets={} skipped={} total datasets={} skipped={}",
            self.status(),
            self.pair_count,
            self.pair_skip_count,
            self.dataset_count,
            self.dataset_skip_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_when_nothing_skipped() {
        let mut r = RunReport::new();
        r.pair_attempted();
        r.dataset_attempted();
        assert_eq!(r.status(), Status::Success);
        assert_eq!(r.summary_line(), "SUCCESS: total sets=1 skipped=0 total datasets=1 skipped=0");
    }

    #[test]
    fn warning_when_any_skip() {
        let mut r = RunReport::new();
        r.pair_attempted();
        r.pair_skipped();
        assert_eq!(r.status(), Status::Warning);
        assert!(r.summary_line().starts_with("WARNING"));
    }
}
