//! `condition`: a hard gate on the trigger payload.
//!
//! There is no else-branch: a condition that evaluates false halts the run
//! and the execution ends `failed`.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::interpolate::render;
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Strict JSON equality, no coercion.
    Equals,
    /// Substring on text, membership on arrays.
    Contains,
    GreaterThan,
    LessThan,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionConfig {
    /// Path into `trigger_data`.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

pub struct ConditionHandler;

impl ConditionHandler {
    pub fn evaluate(config: &ConditionConfig, ctx: &ExecutionContext) -> bool {
        let actual = ctx.trigger_field(&config.field).unwrap_or(&Value::Null);
        let expected = &config.value;

        match config.operator {
            Operator::Equals => actual == expected,
            Operator::Contains => match actual {
                Value::Null => false,
                Value::Array(items) => items.contains(expected),
                other => render(other).contains(&render(expected)),
            },
            Operator::GreaterThan => compare(actual, expected, |a, b| a > b),
            Operator::LessThan => compare(actual, expected, |a, b| a < b),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[async_trait]
impl StepHandler for ConditionHandler {
    const STEP_TYPE: &'static str = "condition";
    type Config = ConditionConfig;

    async fn execute(
        &self,
        config: &ConditionConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let description = format!("{} {} {}", config.field, config.operator, config.value);

        if Self::evaluate(config, ctx) {
            Ok(StepOutcome::success(format!("Condition met: {description}")))
        } else {
            let actual = ctx.trigger_field(&config.field).unwrap_or(&Value::Null);
            Ok(StepOutcome::failure(format!(
                "Condition not met: {description} (actual: {actual})"
            )))
        }
    }
}
