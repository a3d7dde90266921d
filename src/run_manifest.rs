//! Records what a successful run wrote
//!
//! Stores content hashes of every generated file and the final symbol index
//! in `<out>/.ava/manifest.json`, so the next run can tell which files it
//! actually changed.

use crate::data::ProjectState;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_DIR: &str = ".ava";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    /// The user request that produced these files
    pub request: String,
    /// Relative path -> SHA-256 of the content
    pub files: BTreeMap<String, String>,
    pub project_index: BTreeMap<String, String>,
}

impl RunManifest {
    pub fn from_state(request: &str, state: &ProjectState) -> Self {
        Self {
            generated_at: Utc::now(),
            request: request.to_string(),
            files: state
                .final_code
                .iter()
                .map(|(path, content)| (path.clone(), hash_content(content)))
                .collect(),
            project_index: state.project_index.clone(),
        }
    }

    /// Loads the manifest of the previous run into `out_dir`, if any
    pub fn load(out_dir: &Path) -> Result<Option<Self>> {
        let path = Self::manifest_path(out_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn save(&self, out_dir: &Path) -> Result<()> {
        let dir = out_dir.join(MANIFEST_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        let path = Self::manifest_path(out_dir);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Files whose content differs from `previous` or that it did not have
    pub fn changed_since(&self, previous: Option<&RunManifest>) -> Vec<String> {
        self.files
            .iter()
            .filter(|(path, hash)| previous.and_then(|p| p.files.get(*path)) != Some(*hash))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn manifest_path(out_dir: &Path) -> PathBuf {
        out_dir.join(MANIFEST_DIR).join(MANIFEST_FILE)
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
