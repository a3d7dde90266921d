use serde::Serialize;
use std::collections::BTreeMap;

/// Mutable accumulator owned by the coordinator for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectState {
    /// Relative path -> accepted content; starts as a copy of the existing files
    pub final_code: BTreeMap<String, String>,
    /// Symbol name -> defining module path; only ever grows
    pub project_index: BTreeMap<String, String>,
}

impl ProjectState {
    pub fn from_existing(existing_files: &BTreeMap<String, String>) -> Self {
        Self {
            final_code: existing_files.clone(),
            project_index: BTreeMap::new(),
        }
    }

    /// Merges newly discovered symbols; a symbol keeps the module that defined it first.
    pub fn extend_index(&mut self, symbols: BTreeMap<String, String>) -> usize {
        let before = self.project_index.len();
        for (name, module) in symbols {
            self.project_index.entry(name).or_insert(module);
        }
        self.project_index.len() - before
    }

    pub fn accept_file(&mut self, path: &str, content: String) {
        self.final_code.insert(path.to_string(), content);
    }
}

/// A reviewer's verdict on one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub approved: bool,
    pub feedback: Option<String>,
}

impl ReviewOutcome {
    pub fn approved() -> Self {
        Self {
            approved: true,
            feedback: None,
        }
    }

    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// Per-file attempt bookkeeping
#[derive(Debug, Clone, Default)]
pub struct AttemptState {
    pub attempt_number: usize,
    pub current_content: String,
    /// Accumulates across attempts, never cleared
    pub feedback_history: Vec<String>,
}

impl AttemptState {
    pub fn record_rejection(&mut self, feedback: String) {
        self.feedback_history.push(feedback);
    }

    /// All feedback so far, numbered by the attempt that earned it
    pub fn cumulative_feedback(&self) -> String {
        self.feedback_history
            .iter()
            .enumerate()
            .map(|(i, feedback)| format!("--- Review of attempt {} ---\n{}", i + 1, feedback.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
