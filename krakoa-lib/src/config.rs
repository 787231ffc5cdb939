//! Settings of a run that callers may want to change.

/// steps [`crate::vm::Runtime::run_with`] executes at most
pub const DEFAULT_STEP_BUDGET: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub step_budget: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }
}
