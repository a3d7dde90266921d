use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directories never read as project sources
const SKIPPED_DIRS: &[&str] = &[
    ".git", ".ava", ".venv", "venv", "__pycache__", "node_modules", ".mypy_cache", ".pytest_cache",
];

/// Reads every UTF-8 file under `root`, keyed by its `/`-separated relative path
pub fn read_project(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return Ok(files);
    }
    collect_files(root, root, &mut files)?;
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, files: &mut BTreeMap<String, String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name.as_str()) {
                collect_files(root, &path, files)?;
            }
            continue;
        }

        let Ok(content) = fs::read_to_string(&path) else {
            tracing::debug!("Skipping non-text file {}", path.display());
            continue;
        };
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        files.insert(relative_key(relative), content);
    }
    Ok(())
}

fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves a generated relative path under `root`, refusing anything that
/// would land outside it
pub fn resolve_output_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
        anyhow::bail!("Refusing to write outside the output directory: {}", relative.display());
    }
    Ok(root.join(relative))
}

/// Writes `files` under `root`, creating directories as needed
pub fn write_project(root: &Path, files: &BTreeMap<String, String>) -> Result<usize> {
    for (relative, content) in files {
        let path = resolve_output_path(root, relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(files.len())
}
