use async_trait::async_trait;
use ava::contexts::{
    ChunkStream, ExecutionError, FinalReviewService, GenerationCoordinator, GenerationService,
    Model, ModelClient, PipelineSettings, Role,
};
use ava::data::{GenerationRequest, PipelineEvent, ProjectState};
use ava::registries::{BuiltinPromptRegistry, StaticRoleModelRegistry};
use futures::StreamExt;
use futures::stream;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

enum Reply {
    Text(String),
    /// Some chunks, then a transport failure
    Broken(String),
}

#[derive(Default)]
struct Script {
    replies: HashMap<Role, VecDeque<Reply>>,
    calls: Vec<(Role, String)>,
}

/// Answers each role from its own queue and records every prompt
#[derive(Clone, Default)]
struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    fn reply(self, role: Role, text: impl Into<String>) -> Self {
        self.push(role, Reply::Text(text.into()))
    }

    fn reply_json(self, role: Role, value: serde_json::Value) -> Self {
        self.reply(role, value.to_string())
    }

    fn broken(self, role: Role, partial: &str) -> Self {
        self.push(role, Reply::Broken(partial.to_string()))
    }

    fn push(self, role: Role, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(role)
            .or_default()
            .push_back(reply);
        self
    }

    fn calls(&self) -> Vec<(Role, String)> {
        self.script.lock().unwrap().calls.clone()
    }

    fn calls_for(&self, role: Role) -> usize {
        self.calls().iter().filter(|(r, _)| *r == role).count()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream_chat(
        &self,
        _model: &Model,
        prompt: &str,
        role: Role,
    ) -> Result<ChunkStream, ExecutionError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((role, prompt.to_string()));
        let reply = script
            .replies
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted reply left for {}", role));

        let items: Vec<Result<String, ExecutionError>> = match reply {
            Reply::Text(text) => {
                let middle = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
                vec![Ok(text[..middle].to_string()), Ok(text[middle..].to_string())]
            }
            Reply::Broken(partial) => vec![
                Ok(partial),
                Err(ExecutionError::ExecutionFailed("connection reset".to_string())),
                Ok("never delivered".to_string()),
            ],
        };
        Ok(stream::iter(items).boxed())
    }
}

type TestCoordinator = GenerationCoordinator<
    ScriptedClient,
    StaticRoleModelRegistry,
    BuiltinPromptRegistry,
    UnboundedSender<PipelineEvent>,
>;

fn coordinator(client: &ScriptedClient) -> (TestCoordinator, UnboundedReceiver<PipelineEvent>) {
    let registry = StaticRoleModelRegistry::uniform(Model::new("test", "scripted"));
    let generation = Arc::new(GenerationService::new(client.clone(), registry));
    let (tx, rx) = unbounded_channel();
    let coordinator = GenerationCoordinator::new(
        generation,
        BuiltinPromptRegistry,
        tx,
        PipelineSettings::default(),
    );
    (coordinator, rx)
}

async fn run(client: &ScriptedClient, request: GenerationRequest) -> (Option<ProjectState>, Vec<PipelineEvent>) {
    let (coordinator, mut rx) = coordinator(client);
    let result = coordinator.coordinate_generation(&request).await;
    drop(coordinator);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn finished(events: &[PipelineEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::WorkflowFinished { success, .. } => Some(*success),
            _ => None,
        })
        .collect()
}

fn strategy() -> serde_json::Value {
    json!({"high_level_plan": "single-file CLI", "pydantic_models": ""})
}

fn contract(files: &[(&str, &str)]) -> serde_json::Value {
    let entries: Vec<_> = files
        .iter()
        .map(|(file, function)| {
            json!({
                "file": file,
                "purpose": format!("Implements {}", function),
                "imports": [],
                "public_members": [{
                    "type": "function",
                    "name": function,
                    "signature": format!("def {}() -> None", function),
                    "docstring": "Does the work.",
                    "implementation_notes": []
                }]
            })
        })
        .collect();
    json!({ "interface_contract": entries })
}

fn approve() -> serde_json::Value {
    json!({"approved": true})
}

fn reject(feedback: &str) -> serde_json::Value {
    json!({"approved": false, "feedback": feedback})
}

const CALCULATOR: &str = "```python\nimport sys\n\n\ndef main() -> None:\n    \"\"\"Adds the numbers given on the command line.\"\"\"\n    print(sum(float(a) for a in sys.argv[1:]))\n\n\nif __name__ == \"__main__\":\n    main()\n```";

#[tokio::test]
async fn builds_cli_calculator_end_to_end() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("calculator.py", "main")]))
        .reply(Role::Coder, CALCULATOR)
        .reply_json(Role::Reviewer, approve());

    let (result, events) = run(&client, GenerationRequest::new("build a CLI calculator")).await;
    let state = result.expect("pipeline should succeed");

    assert_eq!(state.final_code.keys().collect::<Vec<_>>(), vec!["calculator.py"]);
    let code = &state.final_code["calculator.py"];
    assert!(code.starts_with("import sys"));
    assert!(!code.contains("```"));
    assert_eq!(
        state.project_index,
        BTreeMap::from([("main".to_string(), "calculator".to_string())])
    );

    assert_eq!(events.first(), Some(&PipelineEvent::WorkflowStarted));
    assert_eq!(finished(&events), vec![true]);
    let contract_at = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::ContractReady { files } if files == &vec!["calculator.py".to_string()]))
        .expect("contract published");
    let first_chunk_at = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::StreamText { .. }))
        .expect("code streamed");
    assert!(contract_at < first_chunk_at);
}

#[tokio::test]
async fn escalated_attempts_carry_all_feedback() {
    // With the default escalation role, the reviewer both rewrites and reviews
    // from attempt 2 on, so its queue interleaves reviews and rewrites.
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("calculator.py", "main")]))
        .reply(Role::Coder, "def main() -> None:\n    pass")
        .reply_json(Role::Reviewer, reject("FEEDBACK-ONE: main does nothing"))
        .reply(Role::Reviewer, "def main() -> None:\n    print(0)")
        .reply_json(Role::Reviewer, reject("FEEDBACK-TWO: ignores argv"))
        .reply(Role::Reviewer, CALCULATOR)
        .reply_json(Role::Reviewer, approve());

    let (result, events) = run(&client, GenerationRequest::new("build a CLI calculator")).await;
    assert!(result.is_some());
    assert_eq!(finished(&events), vec![true]);

    let calls = client.calls();
    assert_eq!(calls.len(), 8);
    let (first_role, _) = &calls[2];
    let (second_role, second_prompt) = &calls[4];
    let (third_role, third_prompt) = &calls[6];

    assert_eq!(*first_role, Role::Coder);
    assert_ne!(second_role, first_role);
    assert_ne!(third_role, first_role);

    assert!(second_prompt.contains("FEEDBACK-ONE"));
    assert!(third_prompt.contains("FEEDBACK-ONE"));
    assert!(third_prompt.contains("FEEDBACK-TWO"));
    assert!(third_prompt.contains("print(0)"));

    let rejections = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ReviewCompleted { approved: false, .. }))
        .count();
    assert_eq!(rejections, 2);
}

#[tokio::test]
async fn one_unapprovable_file_discards_the_whole_run() {
    let files: Vec<(String, String)> = (0..10)
        .map(|i| (format!("module_{}.py", i), format!("func_{}", i)))
        .collect();
    let file_refs: Vec<(&str, &str)> = files.iter().map(|(f, n)| (f.as_str(), n.as_str())).collect();

    let mut client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&file_refs));
    for (_, function) in &files {
        client = client.reply(Role::Coder, format!("def {}() -> None:\n    return None", function));
    }
    for _ in 0..9 {
        client = client.reply_json(Role::Reviewer, approve());
    }
    client = client
        .reply_json(Role::Reviewer, reject("still wrong"))
        .reply(Role::Reviewer, "def func_9() -> None:\n    return None")
        .reply_json(Role::Reviewer, reject("still wrong"))
        .reply(Role::Reviewer, "def func_9() -> None:\n    return None")
        .reply_json(Role::Reviewer, reject("still wrong"));

    let (result, events) = run(&client, GenerationRequest::new("ten modules")).await;

    assert_eq!(result, None);
    assert_eq!(finished(&events), vec![false]);
    let integrated = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::FileIntegrated { .. }))
        .count();
    assert_eq!(integrated, 9);
}

#[tokio::test]
async fn index_only_grows_with_approved_content() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(
            Role::Architect,
            contract(&[("utils.py", "helper"), ("service.py", "serve"), ("main.py", "main")]),
        )
        .reply(Role::Coder, "def rejected_helper() -> None:\n    pass")
        .reply_json(Role::Reviewer, reject("wrong name"))
        .reply(Role::Reviewer, "def helper() -> None:\n    return None")
        .reply_json(Role::Reviewer, approve())
        .reply(Role::Coder, "from utils import helper\n\n\ndef serve() -> None:\n    helper()")
        .reply_json(Role::Reviewer, approve())
        .reply(Role::Coder, "from service import serve\n\n\ndef main() -> None:\n    serve()")
        .reply_json(Role::Reviewer, approve());

    let (result, _) = run(&client, GenerationRequest::new("three files")).await;
    let state = result.expect("pipeline should succeed");

    let coder_prompts: Vec<String> = client
        .calls()
        .into_iter()
        .filter(|(role, _)| *role == Role::Coder)
        .map(|(_, prompt)| prompt)
        .collect();
    assert_eq!(coder_prompts.len(), 3);

    assert!(!coder_prompts[0].contains("\"helper\": \"utils\""));
    assert!(coder_prompts[1].contains("\"helper\": \"utils\""));
    assert!(coder_prompts[2].contains("\"helper\": \"utils\""));
    assert!(coder_prompts[2].contains("\"serve\": \"service\""));
    assert!(coder_prompts.iter().all(|p| !p.contains("\"rejected_helper\"")));

    assert!(!state.project_index.contains_key("rejected_helper"));
    assert_eq!(state.project_index.len(), 3);
}

#[tokio::test]
async fn unparseable_strategy_aborts_before_any_file() {
    let client = ScriptedClient::default().reply(Role::Architect, "I would build it in Rust instead.");

    let (result, events) = run(&client, GenerationRequest::new("build a CLI calculator")).await;

    assert_eq!(result, None);
    assert_eq!(finished(&events), vec![false]);
    assert_eq!(client.calls().len(), 1);
    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::ContractReady { .. })));
}

#[tokio::test]
async fn empty_contract_aborts() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, json!({"interface_contract": []}));

    let (result, events) = run(&client, GenerationRequest::new("nothing")).await;
    assert_eq!(result, None);
    assert_eq!(finished(&events), vec![false]);
}

#[tokio::test]
async fn stream_failure_is_fatal_without_review() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("calculator.py", "main")]))
        .broken(Role::Coder, "import sys\n");

    let (result, events) = run(&client, GenerationRequest::new("build a CLI calculator")).await;

    assert_eq!(result, None);
    assert_eq!(client.calls_for(Role::Reviewer), 0);
    let streamed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StreamText { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, vec!["import sys\n"]);
    match events.last() {
        Some(PipelineEvent::WorkflowFinished { success, message }) => {
            assert!(!success);
            assert!(message.contains("LLM_API_ERROR"));
        }
        other => panic!("expected a terminal event, got {:?}", other),
    }
}

#[tokio::test]
async fn approved_empty_file_aborts() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("calculator.py", "main")]))
        .reply(Role::Coder, "```python\n```")
        .reply_json(Role::Reviewer, approve());

    let (result, events) = run(&client, GenerationRequest::new("build a CLI calculator")).await;
    assert_eq!(result, None);
    assert_eq!(finished(&events), vec![false]);
}

#[tokio::test]
async fn boilerplate_files_need_no_model() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(
            Role::Architect,
            contract(&[("app/__init__.py", "unused"), (".gitignore", "unused"), ("app/main.py", "main")]),
        )
        .reply(Role::Coder, "def main() -> None:\n    print('hi')")
        .reply_json(Role::Reviewer, approve());

    let (result, _) = run(&client, GenerationRequest::new("hello app")).await;
    let state = result.expect("pipeline should succeed");

    assert_eq!(client.calls_for(Role::Coder), 1);
    assert_eq!(state.final_code["app/__init__.py"], "");
    assert!(state.final_code[".gitignore"].contains("__pycache__/"));
    assert_eq!(state.project_index.get("main").map(String::as_str), Some("app.main"));
}

#[tokio::test]
async fn existing_files_seed_index_and_fix_imports() {
    let existing = BTreeMap::from([(
        "utils.py".to_string(),
        "def helper() -> int:\n    return 1\n".to_string(),
    )]);
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("main.py", "main")]))
        .reply(
            Role::Coder,
            "from helpers import helper\n\n\ndef main() -> None:\n    print(helper())",
        )
        .reply_json(Role::Reviewer, approve());

    let request = GenerationRequest::new("use the helper").with_existing_files(existing);
    let (result, events) = run(&client, request).await;
    let state = result.expect("pipeline should succeed");

    let strategy_prompt = &client.calls()[0].1;
    assert!(strategy_prompt.contains("utils.py"));
    assert!(strategy_prompt.contains("helper"));

    assert!(state.final_code.contains_key("utils.py"));
    assert!(state.final_code["main.py"].starts_with("from utils import helper\n"));
    assert_eq!(state.project_index.get("helper").map(String::as_str), Some("utils"));
    assert_eq!(state.project_index.get("main").map(String::as_str), Some("main"));

    let republished = events.iter().any(|e| {
        matches!(e, PipelineEvent::FileContentUpdated { file, content }
            if file == "main.py" && content.starts_with("from utils import helper"))
    });
    assert!(republished);
}

#[tokio::test]
async fn final_review_patches_the_approved_project() {
    let client = ScriptedClient::default()
        .reply_json(Role::Architect, strategy())
        .reply_json(Role::Architect, contract(&[("calculator.py", "main")]))
        .reply(Role::Coder, CALCULATOR)
        .reply_json(Role::Reviewer, approve())
        .reply_json(
            Role::Architect,
            json!({"fixes": [
                {
                    "filename": "calculator.py",
                    "description": "integers only",
                    "start_line": 6,
                    "end_line": 6,
                    "corrected_code": "    print(sum(int(a) for a in sys.argv[1:]))"
                },
                {"filename": "calculator.py", "start_line": 40, "end_line": 41, "corrected_code": "x"}
            ]}),
        );

    let (result, _) = run(&client, GenerationRequest::new("build a CLI calculator")).await;
    let state = result.expect("pipeline should succeed");

    let registry = StaticRoleModelRegistry::uniform(Model::new("test", "scripted"));
    let generation = Arc::new(GenerationService::new(client.clone(), registry));
    let (tx, _rx) = unbounded_channel();
    let reviewer = FinalReviewService::new(generation, BuiltinPromptRegistry, tx);
    let reviewed = reviewer
        .execute("build a CLI calculator", &state.final_code)
        .await;

    let code = &reviewed["calculator.py"];
    assert!(code.contains("print(sum(int(a) for a in sys.argv[1:]))"));
    assert!(!code.contains("float(a)"));
    assert_eq!(code.lines().count(), state.final_code["calculator.py"].lines().count());

    let (role, prompt) = client.calls().last().cloned().expect("final review call");
    assert_eq!(role, Role::Architect);
    assert!(prompt.contains("   6 |     print(sum(float(a) for a in sys.argv[1:]))"));
}
