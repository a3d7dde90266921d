use super::code_sanitizer::sanitize_code_output;
use super::generation_service::GenerationService;
use super::import_fixer::fix_imports;
use super::model_client::{ExecutionError, ModelClient, Role, RoleModelRegistry};
use super::prompt_template::{PopulateError, PromptRegistry, populate};
use super::response_validator::extract_and_parse_json;
use super::scaffolding::excerpt;
use super::structure_scanner::render_project_summary;
use super::symbol_indexer::{build_index, get_symbols_from_content, is_python_module, module_path_for};
use crate::data::{
    AttemptState, EventSink, FileSpec, GenerationRequest, InterfaceContract, PipelineEvent,
    ProjectState, ReviewOutcome, Strategy,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_GITIGNORE: &str = "# Default ignore list\n.venv/\nvenv/\n__pycache__/\n*.py[co]\n.env\n*.log\n";

const UNPARSEABLE_REVIEW_FEEDBACK: &str =
    "The review could not be parsed. Re-check the file against every point of its contract.";
const MISSING_FEEDBACK: &str = "The reviewer rejected the file without giving reasons.";

/// Tunables for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Upper bound on generate/review cycles per file
    pub max_attempts: usize,
    /// Role that writes attempts 2 and later
    pub escalation_role: Role,
    /// Pause between files, for UIs that animate progress
    pub inter_file_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            escalation_role: Role::Reviewer,
            inter_file_delay: Duration::ZERO,
        }
    }
}

/// Reasons a run is abandoned as a whole
#[derive(Debug)]
pub enum PipelineError {
    Template(PopulateError),
    EmptyResponse { stage: &'static str },
    UnparseableResponse { stage: &'static str, excerpt: String },
    InvalidStrategy(String),
    InvalidContract,
    Generation { file: String, source: ExecutionError },
    NotApproved { file: String, attempts: usize },
    EmptyContent { file: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Template(e) => write!(f, "Prompt error: {}", e),
            PipelineError::EmptyResponse { stage } => {
                write!(f, "The architect returned nothing during the {} stage", stage)
            }
            PipelineError::UnparseableResponse { stage, excerpt } => {
                write!(f, "No valid JSON in the {} response: {}", stage, excerpt)
            }
            PipelineError::InvalidStrategy(details) => {
                write!(f, "The strategy is missing required fields: {}", details)
            }
            PipelineError::InvalidContract => {
                write!(f, "The architect did not produce a usable interface contract")
            }
            PipelineError::Generation { file, source } => {
                write!(f, "Generation failed for {}: {}", file, source)
            }
            PipelineError::NotApproved { file, attempts } => {
                write!(f, "{} was not approved after {} attempt(s)", file, attempts)
            }
            PipelineError::EmptyContent { file } => {
                write!(f, "{} was approved but has no content", file)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Template(e) => Some(e),
            PipelineError::Generation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PopulateError> for PipelineError {
    fn from(e: PopulateError) -> Self {
        PipelineError::Template(e)
    }
}

#[derive(Serialize)]
struct StrategyInput<'a> {
    user_request: &'a str,
    project_summary: String,
}

#[derive(Serialize)]
struct ContractInput<'a> {
    user_request: &'a str,
    high_level_plan: &'a str,
    data_models: &'a str,
}

/// Everything a coder needs to know about one contract entry
#[derive(Serialize)]
struct FileInput<'a> {
    user_request: &'a str,
    target_file: &'a str,
    purpose: &'a str,
    imports: String,
    public_members: String,
    interface_context: String,
    data_models: &'a str,
    symbol_index: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct CorrectorInput<'a> {
    #[serde(flatten)]
    file: &'a FileInput<'a>,
    failed_code: &'a str,
    reviewer_feedback: String,
}

#[derive(Serialize)]
struct ReviewInput<'a> {
    user_request: &'a str,
    target_file: &'a str,
    purpose: &'a str,
    public_members: &'a str,
    interface_context: &'a str,
    attempt: usize,
    code: &'a str,
}

/// Drives one request from plan to approved files.
///
/// Stages run strictly in order: strategy, contract, then each contract file
/// through generate/review/escalate and integration. Any fatal failure
/// discards everything produced so far.
pub struct GenerationCoordinator<C, R, P, E>
where
    C: ModelClient,
    R: RoleModelRegistry,
    P: PromptRegistry,
    E: EventSink,
{
    generation: Arc<GenerationService<C, R>>,
    prompts: P,
    events: E,
    settings: PipelineSettings,
}

impl<C, R, P, E> GenerationCoordinator<C, R, P, E>
where
    C: ModelClient,
    R: RoleModelRegistry,
    P: PromptRegistry,
    E: EventSink,
{
    pub fn new(
        generation: Arc<GenerationService<C, R>>,
        prompts: P,
        events: E,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generation,
            prompts,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs the whole pipeline.
    ///
    /// Returns the final project state, or `None` when any stage aborted the
    /// run. Exactly one `WorkflowFinished` event is emitted either way.
    pub async fn coordinate_generation(&self, request: &GenerationRequest) -> Option<ProjectState> {
        self.events.emit(PipelineEvent::WorkflowStarted);

        match self.run(request).await {
            Ok(state) => {
                let message = format!("Generated {} file(s)", state.final_code.len());
                tracing::info!("{}", message);
                self.events.emit(PipelineEvent::WorkflowFinished {
                    success: true,
                    message,
                });
                Some(state)
            }
            Err(e) => {
                tracing::error!("Generation aborted: {}", e);
                self.events.emit(PipelineEvent::WorkflowFinished {
                    success: false,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    async fn run(&self, request: &GenerationRequest) -> Result<ProjectState, PipelineError> {
        let mut state = ProjectState::from_existing(&request.existing_files);
        let seeded = state.extend_index(build_index(&request.existing_files));
        if seeded > 0 {
            tracing::debug!("Seeded project index with {} existing symbol(s)", seeded);
        }

        let strategy = self.plan_strategy(request).await?;
        let contract = self.plan_contract(request, &strategy).await?;

        let files = contract.file_names();
        tracing::info!("Architect planned {} file(s): {}", files.len(), files.join(", "));
        self.events.emit(PipelineEvent::ContractReady { files });

        let total = contract.len();
        for (i, spec) in contract.files.iter().enumerate() {
            if i > 0 && !self.settings.inter_file_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_file_delay).await;
            }

            tracing::info!("Coder starting file ({}/{}): {}", i + 1, total, spec.file);
            self.events.emit(PipelineEvent::AgentStatusChanged {
                agent: "Coder".to_string(),
                status: format!("Writing {} ({}/{})...", spec.file, i + 1, total),
            });

            let content = match boilerplate_content(&spec.file) {
                Some(content) => {
                    self.events.emit(PipelineEvent::FileContentUpdated {
                        file: spec.file.clone(),
                        content: content.to_string(),
                    });
                    content.to_string()
                }
                None => {
                    self.generate_file(request, &strategy, &contract, spec, &state)
                        .await?
                }
            };

            self.integrate(&mut state, &spec.file, content);
        }

        Ok(state)
    }

    async fn plan_strategy(&self, request: &GenerationRequest) -> Result<Strategy, PipelineError> {
        self.events.emit(PipelineEvent::AgentStatusChanged {
            agent: "Architect".to_string(),
            status: "Planning project strategy...".to_string(),
        });

        let prompt = self.render(
            "architect_strategy",
            &StrategyInput {
                user_request: &request.prompt,
                project_summary: render_project_summary(&request.existing_files),
            },
        )?;
        let value = self.call_for_json(&prompt, "strategy").await?;
        serde_json::from_value(value).map_err(|e| PipelineError::InvalidStrategy(e.to_string()))
    }

    async fn plan_contract(
        &self,
        request: &GenerationRequest,
        strategy: &Strategy,
    ) -> Result<InterfaceContract, PipelineError> {
        self.events.emit(PipelineEvent::AgentStatusChanged {
            agent: "Architect".to_string(),
            status: "Designing interface contract...".to_string(),
        });

        let prompt = self.render(
            "architect_contract",
            &ContractInput {
                user_request: &request.prompt,
                high_level_plan: &strategy.high_level_plan,
                data_models: &strategy.data_models,
            },
        )?;
        let value = self.call_for_json(&prompt, "contract").await?;
        InterfaceContract::from_value(&value)
            .filter(|contract| !contract.is_empty())
            .ok_or(PipelineError::InvalidContract)
    }

    /// Attempt loop for one file; returns the approved content
    async fn generate_file(
        &self,
        request: &GenerationRequest,
        strategy: &Strategy,
        contract: &InterfaceContract,
        spec: &FileSpec,
        state: &ProjectState,
    ) -> Result<String, PipelineError> {
        let file = spec.file.as_str();
        let input = FileInput {
            user_request: &request.prompt,
            target_file: file,
            purpose: &spec.purpose,
            imports: spec.render_imports(),
            public_members: spec.render_members(),
            interface_context: contract.interface_context_for(file),
            data_models: &strategy.data_models,
            symbol_index: &state.project_index,
        };

        self.events.emit(PipelineEvent::ActivityStarted {
            agent: "Coder".to_string(),
            file: file.to_string(),
        });

        let mut attempt = AttemptState::default();
        let mut approved = false;
        for number in 1..=self.settings.max_attempts {
            attempt.attempt_number = number;

            let (role, prompt) = if number == 1 {
                (Role::Coder, self.render("coder", &input)?)
            } else {
                let role = self.settings.escalation_role;
                tracing::info!("Escalating {} to {} (attempt {})", file, role, number);
                self.events.emit(PipelineEvent::AgentStatusChanged {
                    agent: agent_label(role).to_string(),
                    status: format!(
                        "Correcting {} (attempt {}/{})...",
                        file, number, self.settings.max_attempts
                    ),
                });
                let corrector = CorrectorInput {
                    file: &input,
                    failed_code: &attempt.current_content,
                    reviewer_feedback: attempt.cumulative_feedback(),
                };
                (role, self.render("corrector", &corrector)?)
            };

            let raw = self.stream_file(file, &prompt, role).await?;
            attempt.current_content = sanitize_code_output(&raw);
            self.events.emit(PipelineEvent::FileContentUpdated {
                file: file.to_string(),
                content: attempt.current_content.clone(),
            });

            let outcome = self
                .review(request, &input, number, &attempt.current_content)
                .await?;
            self.events.emit(PipelineEvent::ReviewCompleted {
                file: file.to_string(),
                attempt: number,
                approved: outcome.approved,
                feedback: outcome.feedback.clone(),
            });

            if outcome.approved {
                tracing::info!("{} approved on attempt {}", file, number);
                approved = true;
                break;
            }

            let feedback = outcome.feedback.unwrap_or_else(|| MISSING_FEEDBACK.to_string());
            tracing::warn!("{} rejected on attempt {}: {}", file, number, feedback);
            attempt.record_rejection(feedback);
        }

        self.events.emit(PipelineEvent::ActivityFinished {
            agent: "Coder".to_string(),
            file: file.to_string(),
        });

        if !approved {
            return Err(PipelineError::NotApproved {
                file: file.to_string(),
                attempts: self.settings.max_attempts,
            });
        }
        if attempt.current_content.trim().is_empty() {
            return Err(PipelineError::EmptyContent {
                file: file.to_string(),
            });
        }
        Ok(attempt.current_content)
    }

    /// Streams a generation, forwarding each chunk; any failed chunk is fatal
    async fn stream_file(&self, file: &str, prompt: &str, role: Role) -> Result<String, PipelineError> {
        self.events.emit(PipelineEvent::FileContentUpdated {
            file: file.to_string(),
            content: String::new(),
        });

        let mut chunks = self.generation.stream(prompt, role).await;
        let mut raw = String::new();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => {
                    self.events.emit(PipelineEvent::StreamText {
                        file: file.to_string(),
                        chunk: text.clone(),
                    });
                    raw.push_str(&text);
                }
                Err(source) => {
                    return Err(PipelineError::Generation {
                        file: file.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(raw)
    }

    async fn review(
        &self,
        request: &GenerationRequest,
        input: &FileInput<'_>,
        attempt: usize,
        code: &str,
    ) -> Result<ReviewOutcome, PipelineError> {
        self.events.emit(PipelineEvent::ReviewStarted {
            file: input.target_file.to_string(),
            attempt,
        });

        let prompt = self.render(
            "reviewer",
            &ReviewInput {
                user_request: &request.prompt,
                target_file: input.target_file,
                purpose: input.purpose,
                public_members: &input.public_members,
                interface_context: &input.interface_context,
                attempt,
                code,
            },
        )?;
        let raw = self.generation.call(&prompt, Role::Reviewer).await;
        Ok(parse_review(raw.as_deref()))
    }

    /// Import fixing, index update and acceptance of an approved file
    fn integrate(&self, state: &mut ProjectState, file: &str, content: String) {
        let mut new_symbols = 0;
        let fixed = if is_python_module(file) {
            let module = module_path_for(file);
            let fixed = fix_imports(&content, &state.project_index, &module);
            new_symbols = state.extend_index(get_symbols_from_content(&fixed, &module));
            fixed
        } else {
            content.clone()
        };

        if fixed != content {
            tracing::debug!("Imports in {} were corrected", file);
            self.events.emit(PipelineEvent::FileContentUpdated {
                file: file.to_string(),
                content: fixed.clone(),
            });
        }

        state.accept_file(file, fixed);
        self.events.emit(PipelineEvent::FileIntegrated {
            file: file.to_string(),
            new_symbols,
        });
    }

    async fn call_for_json(&self, prompt: &str, stage: &'static str) -> Result<Value, PipelineError> {
        let raw = self
            .generation
            .call(prompt, Role::Architect)
            .await
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(PipelineError::EmptyResponse { stage })?;

        extract_and_parse_json(&raw).ok_or_else(|| PipelineError::UnparseableResponse {
            stage,
            excerpt: excerpt(&raw),
        })
    }

    fn render<T: Serialize>(&self, name: &str, input: &T) -> Result<String, PipelineError> {
        let template = self.prompts.get_template(name)?;
        Ok(populate(&template, input)?)
    }
}

/// Files written without asking a model
fn boilerplate_content(file: &str) -> Option<&'static str> {
    match file.rsplit('/').next().unwrap_or(file) {
        "__init__.py" => Some(""),
        ".gitignore" => Some(DEFAULT_GITIGNORE),
        _ => None,
    }
}

fn agent_label(role: Role) -> &'static str {
    match role {
        Role::Architect => "Architect",
        Role::Coder => "Coder",
        Role::Reviewer => "Reviewer",
        Role::Tester => "Tester",
    }
}

/// Only a literal `"approved": true` counts as approval
fn parse_review(raw: Option<&str>) -> ReviewOutcome {
    let Some(verdict) = raw.and_then(extract_and_parse_json) else {
        return ReviewOutcome::rejected(UNPARSEABLE_REVIEW_FEEDBACK);
    };

    if verdict.get("approved") == Some(&Value::Bool(true)) {
        return ReviewOutcome::approved();
    }

    let feedback = match verdict.get("feedback") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(s) => format!("- {}", s),
                other => format!("- {}", other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => MISSING_FEEDBACK.to_string(),
    };
    ReviewOutcome::rejected(feedback)
}
