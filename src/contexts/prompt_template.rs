use serde::Serialize;
use std::fmt;

/// Errors that can occur while turning a template into a prompt
#[derive(Debug, Clone, PartialEq)]
pub enum PopulateError {
    MissingMandatoryPlaceholder(String),
    InvalidPlaceholderPath(String),
    TemplateNotFound(String),
    InvalidTemplate(String),
}

impl fmt::Display for PopulateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PopulateError::MissingMandatoryPlaceholder(ph) => {
                write!(f, "Required placeholder '{}' could not be resolved", ph)
            }
            PopulateError::InvalidPlaceholderPath(path) => {
                write!(f, "Invalid path '{}' in placeholder", path)
            }
            PopulateError::TemplateNotFound(name) => {
                write!(f, "Prompt template '{}' not found", name)
            }
            PopulateError::InvalidTemplate(details) => {
                write!(f, "Prompt template is invalid: {}", details)
            }
        }
    }
}

impl std::error::Error for PopulateError {}

/// Trait for loading prompt templates by name
pub trait PromptRegistry: Send + Sync {
    fn get_template(&self, name: &str) -> Result<String, PopulateError>;
}

/// Fills a template with values from `input`.
///
/// Supports:
/// - Mandatory: {{input.prop_name}}
/// - Optional: {{input.prop_name?}}
/// - Nested: {{input.prop1.prop2}}
///
/// Inserted values are never rescanned, so generated code containing `{{`
/// passes through untouched.
pub fn populate<T: Serialize>(template: &str, input: &T) -> Result<String, PopulateError> {
    let input_json =
        serde_json::to_value(input).map_err(|e| PopulateError::InvalidTemplate(e.to_string()))?;

    let mut result = template.to_string();
    let mut offset = 0;

    while let Some(start) = result[offset..].find("{{") {
        let start = offset + start;
        let Some(end_pos) = result[start..].find("}}") else {
            break;
        };
        let end = start + end_pos;

        let placeholder = result[start + 2..end].trim();
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        match resolve_path(&input_json, path)? {
            Some(value) => {
                let replacement = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Null => String::new(),
                    other => serde_json::to_string_pretty(other)
                        .map_err(|e| PopulateError::InvalidTemplate(e.to_string()))?,
                };
                result.replace_range(start..end + 2, &replacement);
                offset = start + replacement.len();
            }
            None if is_optional => {
                result.replace_range(start..end + 2, "");
                offset = start;
            }
            None => return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string())),
        }
    }

    Ok(result)
}

/// Resolves a dotted path such as "input.prop1.prop2"
fn resolve_path<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<Option<&'a serde_json::Value>, PopulateError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
