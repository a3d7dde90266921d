//! Symbol name -> defining module, for cross-file import validation.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn top_level_definition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:async\s+def|def|class)\s+(\w+)|^([A-Z][A-Z0-9_]*)\s*(?::[^=]*)?=[^=]")
            .expect("valid regex")
    })
}

/// `pkg/sub/mod.py` -> `pkg.sub.mod`; `pkg/__init__.py` -> `pkg`
pub fn module_path_for(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./");
    let without_ext = trimmed.strip_suffix(".py").unwrap_or(trimmed);
    let dotted = without_ext.replace('/', ".");
    match dotted.strip_suffix("__init__") {
        Some(package) => package.trim_end_matches('.').to_string(),
        None => dotted,
    }
}

pub fn is_python_module(path: &str) -> bool {
    path.ends_with(".py")
}

/// Top-level classes, functions and UPPER_CASE constants defined in `content`.
///
/// Only call this on content that has passed review.
pub fn get_symbols_from_content(content: &str, module_path: &str) -> BTreeMap<String, String> {
    let mut symbols = BTreeMap::new();
    for line in content.lines() {
        let Some(captures) = top_level_definition_re().captures(line) else {
            continue;
        };
        if let Some(name) = captures.get(1).or_else(|| captures.get(2)) {
            symbols
                .entry(name.as_str().to_string())
                .or_insert_with(|| module_path.to_string());
        }
    }
    symbols
}

/// Index of every Python file in `files`, first definition wins.
pub fn build_index(files: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut index = BTreeMap::new();
    for (path, content) in files.iter().filter(|(p, _)| is_python_module(p)) {
        for (name, module) in get_symbols_from_content(content, &module_path_for(path)) {
            index.entry(name).or_insert(module);
        }
    }
    index
}
