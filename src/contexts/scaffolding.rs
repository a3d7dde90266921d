use super::generation_service::GenerationService;
use super::model_client::{ModelClient, Role, RoleModelRegistry};
use super::prompt_template::{PromptRegistry, populate};
use super::response_validator::{extract_and_parse_json, validate_and_flatten_scaffold};
use crate::data::{EventSink, PipelineEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Serialize)]
struct ScaffoldInput<'a> {
    user_request: &'a str,
}

/// Asks the architect for a whole-project skeleton in a single call
pub struct ScaffoldingService<C, R, P, E>
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

impl<C, R, P, E> ScaffoldingService<C, R, P, E>
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

    /// Returns the flat `path -> content` skeleton, or `None` on any failure
    pub async fn execute(&self, user_request: &str) -> Option<BTreeMap<String, String>> {
        tracing::info!("Architect is building the project skeleton");
        self.events.emit(PipelineEvent::AgentStatusChanged {
            agent: "Architect".to_string(),
            status: "Designing project skeleton...".to_string(),
        });

        let prompt = match self
            .prompts
            .get_template("scaffold")
            .and_then(|template| populate(&template, &ScaffoldInput { user_request }))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::error!("Could not build scaffold prompt: {}", e);
                return None;
            }
        };

        let raw = self.generation.call(&prompt, Role::Architect).await?;
        if raw.trim().is_empty() {
            tracing::error!("Architect returned an empty response");
            return None;
        }

        let Some(parsed) = extract_and_parse_json(&raw) else {
            tracing::error!(
                "Could not extract valid JSON from the architect's response: {}",
                excerpt(&raw)
            );
            return None;
        };

        let Some(scaffold) = validate_and_flatten_scaffold(&parsed) else {
            tracing::error!("Parsed JSON does not contain a file scaffold");
            return None;
        };

        self.events.emit(PipelineEvent::ContractReady {
            files: scaffold.keys().cloned().collect(),
        });
        Some(scaffold)
    }
}

/// First few hundred characters of a response, for log lines
pub(crate) fn excerpt(raw: &str) -> String {
    raw.chars().take(300).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::{ChunkStream, ExecutionError, Model};
    use crate::registries::{BuiltinPromptRegistry, StaticRoleModelRegistry};
    use async_trait::async_trait;
    use futures::StreamExt;
    use futures::stream;

    struct Canned(&'static str);

    #[async_trait]
    impl ModelClient for Canned {
        async fn stream_chat(
            &self,
            _model: &Model,
            _prompt: &str,
            _role: Role,
        ) -> Result<ChunkStream, ExecutionError> {
            Ok(stream::iter(vec![Ok(self.0.to_string())]).boxed())
        }
    }

    fn scaffolder(
        response: &'static str,
    ) -> (
        ScaffoldingService<Canned, StaticRoleModelRegistry, BuiltinPromptRegistry, tokio::sync::mpsc::UnboundedSender<PipelineEvent>>,
        tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let registry =
            StaticRoleModelRegistry::new().with(Role::Architect, Model::new("openai", "gpt-4o"));
        let generation = Arc::new(GenerationService::new(Canned(response), registry));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (ScaffoldingService::new(generation, BuiltinPromptRegistry, tx), rx)
    }

    #[tokio::test]
    async fn returns_flattened_scaffold() {
        let (service, mut rx) = scaffolder(
            "Here you go:\n```json\n{\"App/main.py\": \"def main():\\n    pass\", \"App/util.py\": \"\"}\n```",
        );

        let scaffold = service.execute("hello world").await.expect("scaffold");
        assert_eq!(scaffold.keys().collect::<Vec<_>>(), vec!["main.py", "util.py"]);

        let mut saw_contract = false;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::ContractReady { files } = event {
                assert_eq!(files, vec!["main.py", "util.py"]);
                saw_contract = true;
            }
        }
        assert!(saw_contract);
    }

    #[tokio::test]
    async fn readme_with_code_block_is_kept() {
        let (service, _rx) = scaffolder(
            r#"{"main.py": "print(1)", "README.md": "Run:\n```bash\npython main.py\n```"}"#,
        );

        let scaffold = service.execute("hello").await.expect("scaffold");
        assert_eq!(scaffold.keys().collect::<Vec<_>>(), vec!["README.md", "main.py"]);
        assert!(scaffold["README.md"].contains("```bash"));
    }

    #[tokio::test]
    async fn non_scaffold_response_is_none() {
        let (service, _rx) = scaffolder("{\"name\": \"demo\"}");
        assert_eq!(service.execute("hello").await, None);

        let (service, _rx) = scaffolder("I cannot help with that.");
        assert_eq!(service.execute("hello").await, None);
    }
}
