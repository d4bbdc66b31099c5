//! Prompt assembly: template rendering with the schema example embedded.
//!
//! The processor treats prompts as opaque strings; this module only
//! guarantees that the schema's example JSON ends up somewhere in the text
//! so the model has a shape to imitate.

use std::collections::HashMap;

use crate::schema::Schema;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Placeholder replaced by the schema's example JSON.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with values from `vars`.
/// The special `{input}` placeholder is replaced by the `input` parameter.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use llm_extract::prompt::render;
/// use std::collections::HashMap;
///
/// let mut vars = HashMap::new();
/// vars.insert("name".to_string(), "Alice".to_string());
/// let result = render("Hello {name}, here is JSON: {{\"key\": \"val\"}}", "data", &vars);
/// assert_eq!(result, r#"Hello Alice, here is JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, input: &str, vars: &HashMap<String, String>) -> String {
    // Pass 1: protect escaped braces
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Pass 2: substitute placeholders
    rendered = rendered.replace("{input}", input);
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    // Pass 3: restore escaped braces
    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");
    rendered
}

/// Embed a schema's example JSON into a template.
///
/// Substitutes the `{schema}` placeholder when present; otherwise appends
/// an instruction block so the example always reaches the model.
pub fn embed_example(template: &str, schema: &Schema) -> String {
    let example = schema.example_json();
    if template.contains(SCHEMA_PLACEHOLDER) {
        template.replace(SCHEMA_PLACEHOLDER, &example)
    } else {
        format!(
            "{}\n\nRespond with JSON matching exactly this shape:\n```json\n{}\n```",
            template.trim_end(),
            example
        )
    }
}
