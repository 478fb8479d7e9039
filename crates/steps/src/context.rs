//! Per-run state handed to every step handler.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Values produced by steps, visible to every later step of the same run.
pub type Variables = HashMap<String, Value>;

/// Context for one workflow execution.
///
/// Created fresh when an execution starts (or rebuilt from the persisted
/// record when a suspended execution resumes) and dropped once the
/// execution record is written. Nothing else holds a reference to it, so
/// concurrent executions never share variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    /// Snapshot of the triggering event payload. Never modified by a run.
    pub trigger_data: Value,
    pub variables: Variables,
}

impl ExecutionContext {
    pub fn new(workflow_id: Uuid, execution_id: Uuid, trigger_data: Value) -> Self {
        Self {
            workflow_id,
            execution_id,
            trigger_data,
            variables: Variables::new(),
        }
    }

    /// Resolve `name` against the variables first, then the trigger payload.
    ///
    /// Dotted names (`http_response.id`) walk into nested objects and
    /// arrays. `null` counts as unresolved.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        lookup_variable(&self.variables, name).or_else(|| self.trigger_field(name))
    }

    /// Resolve `path` against the trigger payload only.
    pub fn trigger_field(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.trigger_data, path)
    }

    /// Merge step output into the variables; existing names are overwritten.
    pub fn merge(&mut self, variables: Variables) {
        self.variables.extend(variables);
    }
}

fn lookup_variable<'a>(variables: &'a Variables, name: &str) -> Option<&'a Value> {
    if let Some(value) = variables.get(name) {
        return present(value);
    }
    let (head, rest) = name.split_once('.')?;
    lookup_path(variables.get(head)?, rest)
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    // Keys that themselves contain dots win over path traversal.
    if let Some(value) = root.get(path) {
        return present(value);
    }

    let mut current = root;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    present(current)
}

fn present(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(trigger: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), trigger)
    }

    #[test]
    fn variables_shadow_trigger_data() {
        let mut ctx = ctx(json!({ "name": "from trigger" }));
        ctx.variables.insert("name".into(), json!("from step"));
        assert_eq!(ctx.lookup("name"), Some(&json!("from step")));
    }

    #[test]
    fn null_variable_falls_back_to_trigger_data() {
        let mut ctx = ctx(json!({ "name": "from trigger" }));
        ctx.variables.insert("name".into(), Value::Null);
        assert_eq!(ctx.lookup("name"), Some(&json!("from trigger")));
    }

    #[test]
    fn dotted_paths_walk_objects_and_arrays() {
        let mut ctx = ctx(json!({ "ticket": { "tags": ["urgent", "vip"] } }));
        ctx.variables
            .insert("http_response".into(), json!({ "data": { "id": 7 } }));

        assert_eq!(ctx.lookup("http_response.data.id"), Some(&json!(7)));
        assert_eq!(ctx.lookup("ticket.tags.1"), Some(&json!("vip")));
        assert_eq!(ctx.lookup("ticket.missing"), None);
    }

    #[test]
    fn merge_overwrites_existing_names() {
        let mut ctx = ctx(json!({}));
        ctx.variables.insert("a".into(), json!(1));
        ctx.merge(Variables::from([("a".to_string(), json!(2)), ("b".to_string(), json!(3))]));
        assert_eq!(ctx.variables["a"], json!(2));
        assert_eq!(ctx.variables["b"], json!(3));
    }
}
