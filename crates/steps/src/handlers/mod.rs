//! Built-in step types.

mod approval;
mod condition;
mod function;
mod notify;
mod task;
mod wait;
mod webhook;

pub use approval::{ApprovalConfig, ApprovalHandler};
pub use condition::{ConditionConfig, ConditionHandler, Operator};
pub use function::{FunctionConfig, FunctionHandler, ASSIGN_TO_LEAST_BUSY_AGENT};
pub use notify::{NotifyConfig, NotifyHandler, RecipientType};
pub use task::{TaskConfig, TaskHandler, UPDATE_TICKET};
pub use wait::{WaitConfig, WaitHandler};
pub use webhook::{WebhookConfig, WebhookHandler};

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::{CollaboratorError, ExecutionContext};

fn default_collection() -> String {
    "tickets".to_string()
}

fn default_record_id_field() -> String {
    "ticket_id".to_string()
}

/// Identifier of the target record, read from the trigger payload.
fn record_id(ctx: &ExecutionContext, field: &str) -> Option<String> {
    match ctx.trigger_field(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn bounded<T, F>(
    service: &'static str,
    after: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| CollaboratorError::Timeout { service, after })?
}
