//! `notify`: render a message and hand it to the notification channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::bounded;
use crate::collaborators::{AgentDirectory, Notification, NotificationChannel};
use crate::interpolate::{interpolate, render};
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    AssignedAgent,
    Requester,
    Managers,
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AssignedAgent => "assigned_agent",
            Self::Requester => "requester",
            Self::Managers => "managers",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    pub recipient_type: RecipientType,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

pub struct NotifyHandler {
    agents: Arc<dyn AgentDirectory>,
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl NotifyHandler {
    pub fn new(
        agents: Arc<dyn AgentDirectory>,
        channel: Arc<dyn NotificationChannel>,
        timeout: Duration,
    ) -> Self {
        Self {
            agents,
            channel,
            timeout,
        }
    }

    async fn recipients(
        &self,
        recipient_type: RecipientType,
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>, StepError> {
        let single = |value: Option<&Value>| value.map(render).into_iter().collect::<Vec<_>>();

        Ok(match recipient_type {
            // A `function` step earlier in the run may have just assigned someone.
            RecipientType::AssignedAgent => single(
                ctx.lookup("assigned_agent_id")
                    .or_else(|| ctx.lookup("assigned_to")),
            ),
            RecipientType::Requester => single(ctx.trigger_field("requester_id")),
            RecipientType::Managers => {
                bounded("agent directory", self.timeout, self.agents.managers()).await?
            }
        })
    }
}

#[async_trait]
impl StepHandler for NotifyHandler {
    const STEP_TYPE: &'static str = "notify";
    type Config = NotifyConfig;

    async fn execute(
        &self,
        config: &NotifyConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let recipients = self.recipients(config.recipient_type, ctx).await?;
        if recipients.is_empty() {
            return Ok(StepOutcome::failure(format!(
                "No recipients resolved for {}",
                config.recipient_type
            )));
        }

        let subject = interpolate(&config.subject, ctx);
        let message = interpolate(&config.message, ctx);

        let mut queued = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let notification = Notification {
                recipient,
                subject: subject.clone(),
                message: message.clone(),
            };
            let id = bounded(
                "notification channel",
                self.timeout,
                self.channel.enqueue(&notification),
            )
            .await?;
            debug!(
                recipient = %notification.recipient,
                notification_id = %id,
                "notification queued"
            );
            queued.push(id);
        }

        Ok(StepOutcome::success(format!(
            "Notification \"{subject}\" queued for {} recipient(s) ({})",
            queued.len(),
            config.recipient_type
        ))
        .with_variable("notification_ids", json!(queued)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAgentDirectory, MockNotificationChannel};
    use crate::CollaboratorError;
    use uuid::Uuid;

    fn handler(channel: Arc<MockNotificationChannel>) -> NotifyHandler {
        NotifyHandler::new(
            Arc::new(MockAgentDirectory::empty().with_managers(["m-1", "m-2"])),
            channel,
            Duration::from_secs(1),
        )
    }

    fn config(recipient_type: &str) -> NotifyConfig {
        serde_json::from_value(json!({
            "recipient_type": recipient_type,
            "subject": "Ticket {{ticket_id}}",
            "message": "Hi {{name}}, {{missing}}"
        }))
        .expect("valid config")
    }

    fn ctx(trigger: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), trigger)
    }

    #[tokio::test]
    async fn renders_templates_and_confirms_enqueue() {
        let channel = Arc::new(MockNotificationChannel::new());
        let mut ctx = ExecutionContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({ "ticket_id": 42, "assigned_to": "agent-1" }),
        );
        ctx.variables.insert("name".into(), json!("Ada"));

        let outcome = handler(channel.clone())
            .execute(&config("assigned_agent"), &ctx)
            .await
            .expect("no error");

        assert!(outcome.success, "{}", outcome.message);
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "agent-1");
        assert_eq!(sent[0].subject, "Ticket 42");
        assert_eq!(sent[0].message, "Hi Ada, {{missing}}");
        assert_eq!(outcome.variables["notification_ids"], json!(["n-1"]));
    }

    #[tokio::test]
    async fn assigned_agent_prefers_the_variable_set_by_an_earlier_step() {
        let channel = Arc::new(MockNotificationChannel::new());
        let mut ctx = ctx(json!({ "assigned_to": "old" }));
        ctx.variables.insert("assigned_agent_id".into(), json!("new"));

        handler(channel.clone())
            .execute(&config("assigned_agent"), &ctx)
            .await
            .expect("no error");

        assert_eq!(channel.sent()[0].recipient, "new");
    }

    #[tokio::test]
    async fn managers_are_all_notified() {
        let channel = Arc::new(MockNotificationChannel::new());
        let ctx = ctx(json!({}));

        let outcome = handler(channel.clone())
            .execute(&config("managers"), &ctx)
            .await
            .expect("no error");

        assert!(outcome.success);
        let recipients: Vec<_> = channel.sent().into_iter().map(|n| n.recipient).collect();
        assert_eq!(recipients, vec!["m-1", "m-2"]);
    }

    #[tokio::test]
    async fn missing_requester_is_a_failure() {
        let channel = Arc::new(MockNotificationChannel::new());
        let ctx = ctx(json!({}));

        let outcome = handler(channel.clone())
            .execute(&config("requester"), &ctx)
            .await
            .expect("no error");

        assert!(!outcome.success);
        assert_eq!(outcome.message, "No recipients resolved for requester");
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn unconfirmed_enqueue_is_raised() {
        let channel = Arc::new(MockNotificationChannel::rejecting());
        let ctx = ctx(json!({ "requester_id": "c-1" }));

        let result = handler(channel).execute(&config("requester"), &ctx).await;
        assert!(matches!(
            result,
            Err(StepError::Collaborator(CollaboratorError::Unavailable { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_channel_times_out() {
        let channel = Arc::new(MockNotificationChannel::new().with_delay(Duration::from_secs(30)));
        let ctx = ctx(json!({ "requester_id": "c-1" }));

        let result = handler(channel).execute(&config("requester"), &ctx).await;
        assert!(matches!(
            result,
            Err(StepError::Collaborator(CollaboratorError::Timeout { .. }))
        ));
    }
}
