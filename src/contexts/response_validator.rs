//! Turns raw, unpredictable model output into structured JSON.
//!
//! Model streams are often wrapped in commentary or cut off mid-object. The
//! extractor therefore never parses the whole response: it takes the first
//! complete top-level JSON value found by a balanced-bracket scan and ignores
//! whatever follows it.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Extensions that mark a JSON object key as a file path
const FILE_EXTENSIONS: &[&str] = &[
    ".py", ".md", ".txt", ".json", ".toml", ".yaml", ".yml", ".cfg", ".ini", ".gitignore",
    ".rs", ".js", ".ts", ".html", ".css", ".sh",
];

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("valid regex")
    })
}

/// Extracts and parses the first complete JSON object or array in `raw`.
///
/// A fenced code block is searched first unless JSON already starts before
/// the fence, in which case the fence most likely sits inside a string value.
/// Whichever candidate yields nothing, the other is tried next.
/// Returns `None` for missing, truncated, mismatched or unparseable JSON.
pub fn extract_and_parse_json(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    let Some((fence_start, fenced)) = fenced_block_re()
        .captures(raw)
        .and_then(|c| c.get(0).zip(c.get(1)))
        .map(|(whole, inner)| (whole.start(), inner.as_str()))
    else {
        return parse_first_value(raw);
    };

    if raw[..fence_start].contains(['{', '[']) {
        parse_first_value(raw).or_else(|| parse_first_value(fenced))
    } else {
        parse_first_value(fenced).or_else(|| parse_first_value(raw))
    }
}

fn parse_first_value(text: &str) -> Option<Value> {
    let fragment = first_balanced_fragment(text)?;
    serde_json::from_str(fragment).ok()
}

/// Narrows the search to the text between `<tag>` and `</tag>` before extracting.
pub fn extract_json_from_tag(raw: &str, tag: &str) -> Option<Value> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = raw.find(&open)? + open.len();
    let end = raw[start..].find(&close)? + start;
    extract_and_parse_json(&raw[start..end])
}

/// Returns the slice from the first `{`/`[` up to its matching closer.
fn first_balanced_fragment(text: &str) -> Option<&str> {
    let start = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) => brace.min(bracket),
        (Some(brace), None) => brace,
        (None, Some(bracket)) => bracket,
        (None, None) => return None,
    };

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                let expected = if c == '}' { '{' } else { '[' };
                if stack.pop() != Some(expected) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Finds the file map inside an arbitrarily nested scaffold response and
/// returns it flat, with any spurious wrapping directory removed.
pub fn validate_and_flatten_scaffold(parsed: &Value) -> Option<BTreeMap<String, String>> {
    let found = find_file_map(parsed)?;
    Some(clean_scaffold_paths(found))
}

fn find_file_map(data: &Value) -> Option<BTreeMap<String, String>> {
    match data {
        Value::Object(map) if !map.is_empty() => {
            let all_strings = map.values().all(Value::is_string);
            let looks_like_paths = map
                .keys()
                .any(|k| FILE_EXTENSIONS.iter().any(|ext| k.contains(ext)));
            if all_strings && looks_like_paths {
                return Some(
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect(),
                );
            }
            map.values().find_map(find_file_map)
        }
        Value::Array(items) if !items.is_empty() => {
            let file_objects: Option<BTreeMap<String, String>> = items
                .iter()
                .map(|item| {
                    let filename = item.get("filename")?.as_str()?;
                    let content = item.get("content")?.as_str()?;
                    Some((filename.to_string(), content.to_string()))
                })
                .collect();
            if let Some(files) = file_objects {
                return Some(files);
            }
            items.iter().find_map(find_file_map)
        }
        _ => None,
    }
}

/// Strips a leading directory shared by every multi-segment path.
///
/// The prefix only counts as spurious when at least two paths carry it, so a
/// lone nested file next to root files keeps its directory. Paths are left
/// untouched if stripping would collide with an existing key.
pub fn clean_scaffold_paths(scaffold: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let normalized: Vec<Vec<String>> = scaffold
        .keys()
        .map(|p| p.replace('\\', "/").split('/').map(str::to_string).collect())
        .collect();

    let nested: Vec<&Vec<String>> = normalized.iter().filter(|parts| parts.len() > 1).collect();
    if nested.len() < 2 {
        return scaffold;
    }

    let prefix = &nested[0][0];
    if prefix.is_empty() || !nested.iter().all(|parts| &parts[0] == prefix) {
        return scaffold;
    }

    let mut cleaned = BTreeMap::new();
    for (parts, (original, content)) in normalized.iter().zip(scaffold.iter()) {
        let path = if parts.len() > 1 {
            parts[1..].join("/")
        } else {
            original.clone()
        };
        if cleaned.insert(path, content.clone()).is_some() {
            return scaffold;
        }
    }

    tracing::debug!("Stripped spurious scaffold directory '{}'", prefix);
    cleaned
}
