//! Shallow, regex-based discovery of class and function names.
//!
//! No parsing happens here: each stripped line is matched on its own, so a
//! file with syntax errors elsewhere still yields partial results. Nested
//! definitions are matched too and reported alongside top-level ones.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn definition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(class|def)\s+(\w+)").expect("valid regex"))
}

/// Names discovered in one source blob, in order of first appearance.
///
/// Serializes as `{"classes": {"Name": {}}, "functions": {"name": ""}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeStructure {
    #[serde(serialize_with = "names_to_empty_objects")]
    pub classes: Vec<String>,
    #[serde(serialize_with = "names_to_empty_strings")]
    pub functions: Vec<String>,
}

#[derive(Serialize)]
struct ClassDetails {}

fn names_to_empty_objects<S: Serializer>(names: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(names.iter().map(|name| (name, ClassDetails {})))
}

fn names_to_empty_strings<S: Serializer>(names: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(names.iter().map(|name| (name, "")))
}

impl CodeStructure {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.functions.is_empty()
    }
}

pub fn parse_structure(source: &str) -> CodeStructure {
    let mut structure = CodeStructure::default();

    for line in source.lines() {
        let Some(captures) = definition_re().captures(line.trim()) else {
            continue;
        };
        let name = captures[2].to_string();
        let bucket = if &captures[1] == "class" {
            &mut structure.classes
        } else {
            &mut structure.functions
        };
        if !bucket.contains(&name) {
            bucket.push(name);
        }
    }

    structure
}

/// Per-file structural summary used as planning context for existing projects
pub fn render_project_summary(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return "No existing files.".to_string();
    }

    let mut out = Vec::with_capacity(files.len());
    for (path, content) in files {
        let structure = parse_structure(content);
        let mut entry = format!("- {}", path);
        if structure.is_empty() {
            entry.push_str(" (no classes or functions)");
        }
        if !structure.classes.is_empty() {
            entry.push_str(&format!("\n    classes: {}", structure.classes.join(", ")));
        }
        if !structure.functions.is_empty() {
            entry.push_str(&format!("\n    functions: {}", structure.functions.join(", ")));
        }
        out.push(entry);
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_classes_and_functions() {
        let source = "import os\n\nclass Engine:\n    def start(self):\n        pass\n\ndef main():\n    Engine().start()\n";
        let structure = parse_structure(source);
        assert_eq!(structure.classes, vec!["Engine"]);
        assert_eq!(structure.functions, vec!["start", "main"]);
    }

    #[test]
    fn survives_syntax_errors() {
        let source = "def ok():\n    return (\n\nclass Broken(:\n\ndef also_ok(): pass\n";
        let structure = parse_structure(source);
        assert_eq!(structure.functions, vec!["ok", "also_ok"]);
        assert_eq!(structure.classes, vec!["Broken"]);
    }

    #[test]
    fn ignores_async_and_lookalikes() {
        let source = "async def fetch():\n    pass\n# def commented():\ndefine = 1\n";
        assert!(parse_structure(source).is_empty());
    }

    #[test]
    fn serializes_as_name_maps() {
        let structure = parse_structure("class Shape:\n    pass\n\ndef area():\n    pass\n");
        assert_eq!(
            serde_json::to_value(&structure).unwrap(),
            serde_json::json!({"classes": {"Shape": {}}, "functions": {"area": ""}})
        );
    }

    #[test]
    fn summary_lists_each_file() {
        let mut files = BTreeMap::new();
        files.insert("app.py".to_string(), "class App:\n    pass\n".to_string());
        files.insert("notes.txt".to_string(), "hello".to_string());

        let summary = render_project_summary(&files);
        assert!(summary.contains("- app.py\n    classes: App"));
        assert!(summary.contains("- notes.txt (no classes or functions)"));
    }
}
