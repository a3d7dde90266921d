//! Pytest files for individual functions, written by the tester role.

use super::code_extractor::extract_code_block;
use super::code_sanitizer::sanitize_code_output;
use super::generation_service::GenerationService;
use super::model_client::{ModelClient, Role, RoleModelRegistry};
use super::prompt_template::{PromptRegistry, populate};
use super::structure_scanner::parse_structure;
use super::symbol_indexer::module_path_for;
use crate::data::{EventSink, PipelineEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Separates the test code from its requirements in the tester's answer
const REQUIREMENTS_MARKER: &str = "---requirements.txt---";

/// A generated test file and the packages it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTest {
    /// Project-relative path, `tests/test_<function>.py`
    pub path: String,
    pub content: String,
    pub requirements: Vec<String>,
}

#[derive(Serialize)]
struct TesterInput<'a> {
    function_name: &'a str,
    function_code: &'a str,
    module_path: String,
    user_request: Option<&'a str>,
}

pub struct TestGenerationService<C, R, P, E>
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

impl<C, R, P, E> TestGenerationService<C, R, P, E>
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

    /// Writes a pytest file for `function_name`, whose source is
    /// `function_code` inside `source_path`.
    pub async fn generate_test_for_function(
        &self,
        function_name: &str,
        function_code: &str,
        source_path: &str,
        user_request: Option<&str>,
    ) -> Option<GeneratedTest> {
        tracing::info!("Generating unit test for '{}' from {}", function_name, source_path);
        self.events.emit(PipelineEvent::AgentStatusChanged {
            agent: "Tester".to_string(),
            status: format!("Generating test for {}", function_name),
        });

        let input = TesterInput {
            function_name,
            function_code,
            module_path: module_path_for(source_path),
            user_request,
        };
        let prompt = match self
            .prompts
            .get_template("tester")
            .and_then(|template| populate(&template, &input))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::error!("Could not build tester prompt: {}", e);
                return None;
            }
        };

        let raw = self.generation.call(&prompt, Role::Tester).await?;
        let (code, requirements) = split_requirements(&raw);
        let mut content = sanitize_code_output(code);
        if content.is_empty() {
            tracing::error!("Tester returned no test code for '{}'", function_name);
            return None;
        }
        content.push('\n');

        Some(GeneratedTest {
            path: format!("tests/test_{}.py", function_name),
            content,
            requirements,
        })
    }

    /// Tests every public top-level function of one source file.
    ///
    /// Functions the tester fails on are skipped.
    pub async fn generate_tests_for_file(
        &self,
        source_path: &str,
        source: &str,
        user_request: Option<&str>,
    ) -> Vec<GeneratedTest> {
        let mut generated = Vec::new();
        for name in testable_functions(source) {
            let Some(code) = extract_code_block(source, &name) else {
                continue;
            };
            self.events.emit(PipelineEvent::ActivityStarted {
                agent: "Tester".to_string(),
                file: source_path.to_string(),
            });
            if let Some(test) = self
                .generate_test_for_function(&name, &code, source_path, user_request)
                .await
            {
                generated.push(test);
            }
            self.events.emit(PipelineEvent::ActivityFinished {
                agent: "Tester".to_string(),
                file: source_path.to_string(),
            });
        }
        generated
    }
}

/// Public functions defined at the top level of `source`, in order
fn testable_functions(source: &str) -> Vec<String> {
    parse_structure(source)
        .functions
        .into_iter()
        .filter(|name| !name.starts_with('_'))
        .filter(|name| {
            let header = format!("def {}(", name);
            source.lines().any(|line| line.starts_with(&header))
        })
        .collect()
}

/// Splits the tester's answer into code and requirement lines
fn split_requirements(raw: &str) -> (&str, Vec<String>) {
    let Some((code, rest)) = raw.split_once(REQUIREMENTS_MARKER) else {
        return (raw, Vec::new());
    };

    let requirements = rest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```") && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    (code, requirements)
}

/// Adds `extra` packages to an existing `requirements.txt`, skipping
/// packages already listed under any version pin.
pub fn merge_requirements(existing: &str, extra: &[String]) -> String {
    let package = |line: &str| {
        line.split(['=', '<', '>', '~', '!', '[', ';', ' '])
            .next()
            .unwrap_or(line)
            .trim()
            .to_lowercase()
    };

    let mut known: BTreeSet<String> = existing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(package)
        .collect();

    let mut merged = existing.trim_end().to_string();
    for requirement in extra {
        if known.insert(package(requirement)) {
            if !merged.is_empty() {
                merged.push('\n');
            }
            merged.push_str(requirement);
        }
    }
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged
}
