use async_trait::async_trait;
use murmur_config::TaskBinding;
use tracing::debug;

use super::{TaskContext, TaskHandler, TaskOutcome};
use crate::error::AgentError;

/// Performs one configured connection action; succeeds iff the action does.
pub struct DispatchHandler {
    binding: TaskBinding,
}

impl DispatchHandler {
    pub fn new(binding: TaskBinding) -> Self {
        Self { binding }
    }
}

#[async_trait]
impl TaskHandler for DispatchHandler {
    async fn run(&self, cx: &mut TaskContext<'_>) -> Result<TaskOutcome, AgentError> {
        let result = cx
            .perform(
                &self.binding.connection,
                &self.binding.action,
                self.binding.args.clone(),
            )
            .await?;
        debug!(
            connection = %self.binding.connection,
            action = %self.binding.action,
            result = %result,
            "Dispatched action"
        );
        Ok(TaskOutcome::Completed)
    }
}
