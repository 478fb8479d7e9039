//! `webhook`: call an external HTTP endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::collaborators::{HttpClient, HttpRequest};
use crate::http::HttpMethod;
use crate::interpolate::{interpolate, interpolate_value};
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// A JSON template. A string body that holds a JSON object or array is
    /// treated as that tree, so substituted values stay properly escaped.
    /// `{"$var": "name"}` inserts a value with its JSON type.
    #[serde(default)]
    pub body: Option<Value>,
}

pub struct WebhookHandler {
    http: Arc<dyn HttpClient>,
}

impl WebhookHandler {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

fn render_body(body: &Value, ctx: &ExecutionContext) -> Value {
    match body {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(tree @ (Value::Object(_) | Value::Array(_))) => interpolate_value(&tree, ctx),
            _ => Value::String(interpolate(text, ctx)),
        },
        other => interpolate_value(other, ctx),
    }
}

#[async_trait]
impl StepHandler for WebhookHandler {
    const STEP_TYPE: &'static str = "webhook";
    type Config = WebhookConfig;

    async fn execute(
        &self,
        config: &WebhookConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let url = interpolate(&config.url, ctx);
        let request = HttpRequest {
            method: config.method,
            url: url.clone(),
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), interpolate(v, ctx)))
                .collect(),
            body: config.body.as_ref().map(|b| render_body(b, ctx)),
        };

        let response = self.http.send(request).await?;

        if (200..400).contains(&response.status) {
            Ok(StepOutcome::success(format!(
                "Webhook {} {url} returned {}",
                config.method, response.status
            ))
            .with_variable("http_response", response.body.unwrap_or(Value::Null)))
        } else {
            Ok(StepOutcome::failure(format!(
                "Webhook {} {url} failed with status {}",
                config.method, response.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttpClient;
    use crate::CollaboratorError;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({ "ticket_id": 42, "title": "Printer says \"no\"" }),
        )
    }

    fn config(raw: Value) -> WebhookConfig {
        serde_json::from_value(raw).expect("valid config")
    }

    #[tokio::test]
    async fn posts_rendered_body_and_stores_response() {
        let http = Arc::new(MockHttpClient::responding(201, Some(json!({ "id": "ext-1" }))));
        let handler = WebhookHandler::new(http.clone());

        let outcome = handler
            .execute(
                &config(json!({
                    "url": "https://hooks.example.com/t/{{ticket_id}}",
                    "headers": { "X-Ticket": "{{ticket_id}}" },
                    "body": r#"{"title": "{{title}}", "id": "{{ticket_id}}"}"#
                })),
                &ctx(),
            )
            .await
            .expect("no error");

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, "Webhook POST https://hooks.example.com/t/42 returned 201");
        assert_eq!(outcome.variables["http_response"], json!({ "id": "ext-1" }));

        let sent = http.requests();
        assert_eq!(sent[0].headers["X-Ticket"], "42");
        assert_eq!(
            sent[0].body,
            Some(json!({ "title": "Printer says \"no\"", "id": "42" }))
        );
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let http = Arc::new(MockHttpClient::responding(503, None));
        let outcome = WebhookHandler::new(http)
            .execute(&config(json!({ "url": "https://x.test", "method": "GET" })), &ctx())
            .await
            .expect("no error");

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Webhook GET https://x.test failed with status 503");
        assert!(outcome.variables.is_empty());
    }

    #[tokio::test]
    async fn transport_error_is_raised() {
        let http = Arc::new(MockHttpClient::unreachable());
        let result = WebhookHandler::new(http)
            .execute(&config(json!({ "url": "https://x.test" })), &ctx())
            .await;

        assert!(matches!(
            result,
            Err(StepError::Collaborator(CollaboratorError::Unavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn each_call_gets_the_next_canned_response() {
        let http = Arc::new(MockHttpClient::responding(500, None).then(202, None));
        let handler = WebhookHandler::new(http.clone());
        let hook = config(json!({ "url": "https://x.test" }));

        let first = handler.execute(&hook, &ctx()).await.expect("no error");
        let second = handler.execute(&hook, &ctx()).await.expect("no error");

        assert!(!first.success);
        assert!(second.success);
        assert_eq!(second.message, "Webhook POST https://x.test returned 202");
        assert_eq!(http.requests().len(), 2);
    }

    #[test]
    fn var_form_in_body_sends_a_number() {
        let body = json!({ "id": { "$var": "ticket_id" }, "ref": "T-{{ticket_id}}" });
        assert_eq!(render_body(&body, &ctx()), json!({ "id": 42, "ref": "T-42" }));
    }

    #[test]
    fn plain_text_body_is_interpolated_as_text() {
        assert_eq!(
            render_body(&json!("ticket {{ticket_id}}"), &ctx()),
            json!("ticket 42")
        );
    }
}
