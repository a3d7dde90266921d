//! Whole-project review by the architect after every file is approved.
//!
//! The architect answers with line-range edits against the numbered listing
//! it was shown. Edits are validated and spliced in; anything it gets wrong
//! is dropped with a warning and the file keeps its approved content.

use super::generation_service::GenerationService;
use super::model_client::{ModelClient, Role, RoleModelRegistry};
use super::prompt_template::{PromptRegistry, populate};
use super::response_validator::extract_and_parse_json;
use crate::data::{EventSink, PipelineEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One replacement of lines `start_line..=end_line` (1-based) in `filename`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineEdit {
    pub filename: String,
    #[serde(default)]
    pub description: String,
    pub start_line: usize,
    pub end_line: usize,
    pub corrected_code: String,
}

/// Why an edit was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    UnknownFile(String),
    OutOfBounds {
        start: usize,
        end: usize,
        line_count: usize,
    },
    Overlapping {
        start: usize,
        end: usize,
    },
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EditError::UnknownFile(file) => write!(f, "no file named '{}'", file),
            EditError::OutOfBounds {
                start,
                end,
                line_count,
            } => write!(
                f,
                "lines {}-{} are outside a {}-line file",
                start, end, line_count
            ),
            EditError::Overlapping { start, end } => {
                write!(f, "lines {}-{} overlap another edit", start, end)
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Replaces the edited range of `content`, keeping a trailing newline.
pub fn apply_line_edit(content: &str, edit: &LineEdit) -> Result<String, EditError> {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = (edit.start_line, edit.end_line);
    if start == 0 || end < start || end > lines.len() {
        return Err(EditError::OutOfBounds {
            start,
            end,
            line_count: lines.len(),
        });
    }

    let mut spliced: Vec<&str> = Vec::with_capacity(lines.len());
    spliced.extend(&lines[..start - 1]);
    spliced.extend(edit.corrected_code.lines());
    spliced.extend(&lines[end..]);

    let mut result = spliced.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

/// Applies every valid edit and returns the updated files plus the rejects.
///
/// Line numbers always refer to the original content: edits to one file are
/// applied bottom-up, and an edit overlapping one already applied is rejected.
pub fn apply_line_edits(
    files: &BTreeMap<String, String>,
    edits: &[LineEdit],
) -> (BTreeMap<String, String>, Vec<(LineEdit, EditError)>) {
    let mut updated = files.clone();
    let mut rejected = Vec::new();

    let mut by_file: BTreeMap<&str, Vec<&LineEdit>> = BTreeMap::new();
    for edit in edits {
        if files.contains_key(&edit.filename) {
            by_file.entry(edit.filename.as_str()).or_default().push(edit);
        } else {
            rejected.push((edit.clone(), EditError::UnknownFile(edit.filename.clone())));
        }
    }

    for (file, mut file_edits) in by_file {
        file_edits.sort_by(|a, b| b.start_line.cmp(&a.start_line));
        // First line of the lowest edit applied so far
        let mut floor = usize::MAX;

        for edit in file_edits {
            if edit.end_line >= floor {
                rejected.push((
                    edit.clone(),
                    EditError::Overlapping {
                        start: edit.start_line,
                        end: edit.end_line,
                    },
                ));
                continue;
            }
            match apply_line_edit(&updated[file], edit) {
                Ok(content) => {
                    updated.insert(file.to_string(), content);
                    floor = edit.start_line;
                }
                Err(e) => rejected.push((edit.clone(), e)),
            }
        }
    }

    (updated, rejected)
}

/// Renders each file with 1-based line numbers, as shown to the architect
pub fn render_numbered_files(files: &BTreeMap<String, String>) -> String {
    let mut out = Vec::with_capacity(files.len());
    for (path, content) in files {
        let mut entry = format!("### {}", path);
        for (number, line) in content.lines().enumerate() {
            entry.push_str(&format!("\n{:>4} | {}", number + 1, line));
        }
        out.push(entry);
    }
    out.join("\n\n")
}

#[derive(Serialize)]
struct FinalReviewInput<'a> {
    user_request: &'a str,
    files: String,
}

/// Runs the final integration review over a finished project
pub struct FinalReviewService<C, R, P, E>
where
    C: ModelClient,
    R: RoleModelRegistry,
    P: PromptRegistry,
    E: EventSink,
{
    generation: Arc<GenerationService<C, R>>,
    prompts: P,
    events: E,
}

impl<C, R, P, E> FinalReviewService<C, R, P, E>
where
    C: ModelClient,
    R: RoleModelRegistry,
    P: PromptRegistry,
    E: EventSink,
{
    pub fn new(generation: Arc<GenerationService<C, R>>, prompts: P, events: E) -> Self {
        Self {
            generation,
            prompts,
            events,
        }
    }

    /// Returns the reviewed files, or `files` unchanged when the review fails
    pub async fn execute(
        &self,
        user_request: &str,
        files: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        tracing::info!("Architect is performing the final integration review");
        self.events.emit(PipelineEvent::AgentStatusChanged {
            agent: "Architect".to_string(),
            status: "Final review...".to_string(),
        });

        let input = FinalReviewInput {
            user_request,
            files: render_numbered_files(files),
        };
        let prompt = match self
            .prompts
            .get_template("final_review")
            .and_then(|template| populate(&template, &input))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::error!("Could not build final review prompt: {}", e);
                return files.clone();
            }
        };

        let Some(verdict) = self
            .generation
            .call(&prompt, Role::Architect)
            .await
            .as_deref()
            .and_then(extract_and_parse_json)
        else {
            tracing::warn!("Final review returned no valid JSON, keeping files as they are");
            return files.clone();
        };

        let edits = parse_edits(&verdict);
        if edits.is_empty() {
            tracing::info!("Final review found no issues");
            return files.clone();
        }

        tracing::info!("Final review proposed {} fix(es)", edits.len());
        let (updated, rejected) = apply_line_edits(files, &edits);
        for (edit, reason) in &rejected {
            tracing::warn!("Discarded fix for {}: {}", edit.filename, reason);
        }

        for (file, content) in &updated {
            if files.get(file) == Some(content) {
                continue;
            }
            self.events.emit(PipelineEvent::ActivityStarted {
                agent: "Architect".to_string(),
                file: file.clone(),
            });
            self.events.emit(PipelineEvent::FileContentUpdated {
                file: file.clone(),
                content: content.clone(),
            });
            self.events.emit(PipelineEvent::ActivityFinished {
                agent: "Architect".to_string(),
                file: file.clone(),
            });
        }

        updated
    }
}

/// Well-formed entries of the `fixes` list; incomplete ones are dropped
fn parse_edits(verdict: &Value) -> Vec<LineEdit> {
    let Some(fixes) = verdict.get("fixes").and_then(Value::as_array) else {
        return Vec::new();
    };

    fixes
        .iter()
        .filter_map(|fix| match serde_json::from_value::<LineEdit>(fix.clone()) {
            Ok(edit) => Some(edit),
            Err(e) => {
                tracing::warn!("Discarded incomplete fix {}: {}", fix, e);
                None
            }
        })
        .collect()
}
