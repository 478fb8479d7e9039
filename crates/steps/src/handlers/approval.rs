//! `approval`: pause the run until a human decides.

use async_trait::async_trait;
use serde::Deserialize;

use crate::interpolate::interpolate;
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome, Suspend};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalConfig {
    /// Who may decide. Empty means anyone.
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct ApprovalHandler;

#[async_trait]
impl StepHandler for ApprovalHandler {
    const STEP_TYPE: &'static str = "approval";
    type Config = ApprovalConfig;

    async fn execute(
        &self,
        config: &ApprovalConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let from = if config.approvers.is_empty() {
            "any approver".to_string()
        } else {
            config.approvers.join(", ")
        };
        let prompt = config.message.as_deref().map(|m| interpolate(m, ctx));

        Ok(StepOutcome::suspended(
            format!("Awaiting approval from {from}"),
            Suspend::Approval {
                approvers: config.approvers.clone(),
                prompt,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn suspends_with_rendered_prompt() {
        let ctx = ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), json!({ "amount": 900 }));
        let config: ApprovalConfig = serde_json::from_value(json!({
            "approvers": ["lead@example.com"],
            "message": "Refund of {{amount}} needs sign-off"
        }))
        .expect("valid config");

        let outcome = ApprovalHandler.execute(&config, &ctx).await.expect("no error");

        assert!(outcome.success);
        assert_eq!(
            outcome.suspend,
            Some(Suspend::Approval {
                approvers: vec!["lead@example.com".into()],
                prompt: Some("Refund of 900 needs sign-off".into()),
            })
        );
    }
}
