//! `{{token}}` substitution against an [`ExecutionContext`].
//!
//! Tokens resolve against the run's variables first, then the trigger
//! payload (see [`ExecutionContext::lookup`]). Unresolved tokens are left in
//! place verbatim. Both functions are pure.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::ExecutionContext;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("token pattern is valid"));

/// Key of the typed-substitution form `{"$var": "name"}`.
const VAR_KEY: &str = "$var";

/// Substitute every `{{token}}` in `template`.
pub fn interpolate(template: &str, ctx: &ExecutionContext) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            resolve(&caps[1], ctx).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Interpolate every string leaf of a JSON tree.
///
/// String leaves stay strings. An object of the single form
/// `{"$var": "name"}` is replaced by the resolved value with its JSON type;
/// an unresolved one is kept as written. Serialising the result always
/// yields valid JSON, whatever the substituted values contain.
pub fn interpolate_value(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, ctx)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_value(v, ctx)).collect())
        }
        Value::Object(map) => {
            if let Some(resolved) = typed_var(map, ctx) {
                return resolved;
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), interpolate_value(v, ctx)))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

/// Text form of a resolved value: strings bare, everything else as JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve(token: &str, ctx: &ExecutionContext) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    ctx.lookup(token).map(render)
}

fn typed_var(map: &Map<String, Value>, ctx: &ExecutionContext) -> Option<Value> {
    if map.len() != 1 {
        return None;
    }
    let name = map.get(VAR_KEY)?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    ctx.lookup(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx(trigger: Value, vars: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), trigger);
        if let Value::Object(map) = vars {
            ctx.variables.extend(map);
        }
        ctx
    }

    #[test]
    fn resolves_variables_then_trigger_data() {
        let ctx = ctx(json!({ "ticket_id": "42" }), json!({ "name": "Ada" }));
        assert_eq!(
            interpolate("Hello {{name}}, ticket {{ticket_id}}", &ctx),
            "Hello Ada, ticket 42"
        );
    }

    #[test]
    fn unresolved_token_is_left_verbatim() {
        let ctx = ctx(json!({}), json!({}));
        assert_eq!(interpolate("x {{missing}} y", &ctx), "x {{missing}} y");
        assert_eq!(interpolate("{{ missing }}", &ctx), "{{ missing }}");
        assert_eq!(interpolate("{{}}", &ctx), "{{}}");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let ctx = ctx(json!({ "amount": 50 }), json!({}));
        assert_eq!(interpolate("total: {{  amount }}", &ctx), "total: 50");
    }

    #[test]
    fn interpolation_is_idempotent() {
        let ctx = ctx(json!({ "a": "1" }), json!({}));
        let template = "{{a}} and {{b}}";
        assert_eq!(interpolate(template, &ctx), interpolate(template, &ctx));
    }

    #[test]
    fn non_string_values_render_as_json() {
        let ctx = ctx(json!({ "flag": true, "tags": ["a", "b"] }), json!({}));
        assert_eq!(interpolate("{{flag}} {{tags}}", &ctx), r#"true ["a","b"]"#);
    }

    #[test]
    fn value_interpolation_keeps_json_valid_with_quotes() {
        let ctx = ctx(json!({ "comment": "he said \"stop\"\n" }), json!({}));
        let body = json!({ "text": "Comment: {{comment}}", "raw": "{{comment}}" });

        let rendered = interpolate_value(&body, &ctx);
        let wire = serde_json::to_string(&rendered).expect("serialises");
        let parsed: Value = serde_json::from_str(&wire).expect("valid json");

        assert_eq!(parsed["text"], json!("Comment: he said \"stop\"\n"));
        assert_eq!(parsed["raw"], json!("he said \"stop\"\n"));
    }

    #[test]
    fn quoted_token_stays_a_string() {
        let ctx = ctx(json!({ "ticket_id": 42, "tags": ["a"] }), json!({}));
        let body = json!({ "id": "{{ticket_id}}", "tags": "{{tags}}" });
        assert_eq!(
            interpolate_value(&body, &ctx),
            json!({ "id": "42", "tags": r#"["a"]"# })
        );
    }

    #[test]
    fn var_form_substitutes_the_typed_value() {
        let ctx = ctx(json!({ "amount": 120, "items": [1, 2] }), json!({}));
        let body = json!({
            "amount": { "$var": "amount" },
            "nested": [{ "$var": "items" }, 3],
            "missing": { "$var": "nope" },
            "not_a_var": { "$var": "amount", "extra": 1 }
        });
        assert_eq!(
            interpolate_value(&body, &ctx),
            json!({
                "amount": 120,
                "nested": [[1, 2], 3],
                "missing": { "$var": "nope" },
                "not_a_var": { "$var": "amount", "extra": 1 }
            })
        );
    }
}
