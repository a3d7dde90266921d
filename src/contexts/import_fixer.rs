//! Reconciles `from X import Y` statements against the project symbol index.
//!
//! Generated files often import a sibling symbol from the wrong module, or
//! from the file itself. Each single-line `from ... import ...` statement that
//! targets project code is regrouped so every indexed name is imported from
//! the module that actually defines it, and plain self-imports are dropped.
//! An aliased self-import stays, since the alias is still referenced.
//! Statements that target the standard library or well-known third-party
//! packages are never touched.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Top-level packages assumed never to be project code
const EXTERNAL_PACKAGES: &[&str] = &[
    "__future__", "abc", "argparse", "asyncio", "base64", "collections", "contextlib", "copy",
    "csv", "dataclasses", "datetime", "decimal", "enum", "functools", "glob", "hashlib", "heapq",
    "http", "importlib", "inspect", "io", "itertools", "json", "logging", "math", "operator",
    "os", "pathlib", "pickle", "random", "re", "shutil", "sqlite3", "statistics", "string",
    "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "tkinter", "typing",
    "typing_extensions", "unittest", "urllib", "uuid", "warnings", "aiohttp", "click", "django",
    "fastapi", "flask", "httpx", "numpy", "pandas", "pydantic", "PySide6", "pytest", "requests",
    "rich", "sqlalchemy", "typer",
];

fn from_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)from\s+(\.*[\w.]*)\s+import\s+(.+?)\s*$").expect("valid regex")
    })
}

#[derive(Debug, Clone, PartialEq)]
struct ImportedName {
    name: String,
    alias: Option<String>,
}

impl ImportedName {
    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// Rewrites imports in `content` so they resolve against `project_index`.
///
/// `current_module` is the dotted module path of the file being fixed; names
/// it defines itself are never imported.
pub fn fix_imports(
    content: &str,
    project_index: &BTreeMap<String, String>,
    current_module: &str,
) -> String {
    let mut changed = false;
    let mut out: Vec<String> = Vec::new();

    for line in content.lines() {
        match fix_import_line(line, project_index, current_module) {
            Some(replacement) => {
                tracing::debug!("Rewrote import in {}: '{}' -> {:?}", current_module, line.trim(), replacement);
                changed = true;
                out.extend(replacement);
            }
            None => out.push(line.to_string()),
        }
    }

    if !changed {
        return content.to_string();
    }

    let mut fixed = out.join("\n");
    if content.ends_with('\n') {
        fixed.push('\n');
    }
    fixed
}

/// Returns replacement lines, or `None` when the line stays as it is.
fn fix_import_line(
    line: &str,
    project_index: &BTreeMap<String, String>,
    current_module: &str,
) -> Option<Vec<String>> {
    let captures = from_import_re().captures(line)?;
    let indent = &captures[1];
    let module = &captures[2];
    let names_part = &captures[3];

    if module.is_empty() || is_external(module) || names_part.contains('#') {
        return None;
    }

    let names = parse_names(names_part)?;

    let mut groups: Vec<(String, Vec<ImportedName>)> = Vec::new();
    for imported in names {
        let target = match project_index.get(&imported.name) {
            Some(defining) if defining == current_module && imported.alias.is_none() => continue,
            Some(defining) => defining.clone(),
            None => module.to_string(),
        };
        match groups.iter_mut().find(|(m, _)| *m == target) {
            Some((_, bucket)) => {
                if !bucket.contains(&imported) {
                    bucket.push(imported);
                }
            }
            None => groups.push((target, vec![imported])),
        }
    }

    let unchanged = groups.len() == 1
        && groups[0].0 == module
        && parse_names(names_part).is_some_and(|original| original == groups[0].1);
    if unchanged {
        return None;
    }

    Some(
        groups
            .into_iter()
            .map(|(target, names)| {
                let rendered: Vec<String> = names.iter().map(ImportedName::render).collect();
                format!("{}from {} import {}", indent, target, rendered.join(", "))
            })
            .collect(),
    )
}

fn is_external(module: &str) -> bool {
    if module.starts_with('.') {
        return false;
    }
    let root = module.split('.').next().unwrap_or(module);
    EXTERNAL_PACKAGES.contains(&root)
}

/// Parses `a, b as c` or `(a, b)`; `None` for star imports and
/// statements continued on the next line.
fn parse_names(names_part: &str) -> Option<Vec<ImportedName>> {
    let trimmed = names_part.trim();
    let inner = match (trimmed.starts_with('('), trimmed.ends_with(')')) {
        (true, true) => &trimmed[1..trimmed.len() - 1],
        (false, false) => trimmed,
        _ => return None,
    };
    if inner.ends_with('\\') {
        return None;
    }

    let mut names = Vec::new();
    for part in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tokens: Vec<&str> = part.split_whitespace().collect();
        let imported = match tokens.as_slice() {
            ["*"] => return None,
            [name] => ImportedName {
                name: name.to_string(),
                alias: None,
            },
            [name, "as", alias] => ImportedName {
                name: name.to_string(),
                alias: Some(alias.to_string()),
            },
            _ => return None,
        };
        names.push(imported);
    }

    (!names.is_empty()).then_some(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rewrites_hallucinated_module() {
        let idx = index(&[("add", "ops.arithmetic")]);
        let content = "from calculator_ops import add\n\nprint(add(1, 2))\n";
        assert_eq!(
            fix_imports(content, &idx, "main"),
            "from ops.arithmetic import add\n\nprint(add(1, 2))\n"
        );
    }

    #[test]
    fn splits_names_by_defining_module() {
        let idx = index(&[("Store", "app.store"), ("render", "app.ui")]);
        let content = "from app.store import Store, render as draw, missing";
        assert_eq!(
            fix_imports(content, &idx, "main"),
            "from app.store import Store, missing\nfrom app.ui import render as draw"
        );
    }

    #[test]
    fn drops_self_imports() {
        let idx = index(&[("main", "calculator"), ("helper", "util")]);
        let content = "from calculator import main\nfrom calculator import main, helper\n";
        assert_eq!(
            fix_imports(content, &idx, "calculator"),
            "from util import helper\n"
        );
    }

    #[test]
    fn aliased_self_imports_are_kept() {
        let idx = index(&[("main", "calculator"), ("helper", "util")]);
        let content = "from calculator import main as run, helper\nrun()\n";
        assert_eq!(
            fix_imports(content, &idx, "calculator"),
            "from calculator import main as run\nfrom util import helper\nrun()\n"
        );

        let untouched = "from calculator import main as run\n";
        assert_eq!(fix_imports(untouched, &idx, "calculator"), untouched);
    }

    #[test]
    fn leaves_external_and_correct_imports_alone() {
        let idx = index(&[("List", "app.models"), ("Store", "app.store")]);
        let content = "from typing import List\nfrom app.store import Store\nimport os\n";
        assert_eq!(fix_imports(content, &idx, "main"), content);
    }

    #[test]
    fn rewrites_relative_imports_and_keeps_indentation() {
        let idx = index(&[("Config", "app.config")]);
        let content = "def load():\n    from .settings import (Config)\n    return Config()";
        assert_eq!(
            fix_imports(content, &idx, "app.loader"),
            "def load():\n    from app.config import Config\n    return Config()"
        );
    }

    #[test]
    fn star_and_multiline_imports_are_untouched() {
        let idx = index(&[("a", "m")]);
        let content = "from x import *\nfrom y import (\n    a,\n)\n";
        assert_eq!(fix_imports(content, &idx, "main"), content);
    }
}
