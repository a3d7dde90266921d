use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

mod progress;
mod project_files;

use ava::config::AppConfig;
use ava::contexts::{
    FinalReviewService, GenerationCoordinator, GenerationService, ScaffoldingService,
    TestGenerationService, build_index, extract_code_block, merge_requirements, parse_structure,
};
use ava::data::{GenerationRequest, PipelineEvent, ProjectState};
use ava::registries::{FilePromptRegistry, FileRoleModelRegistry, OpenAiCompatibleClient};
use ava::run_manifest::RunManifest;
use progress::ProgressIndicator;
use project_files::{read_project, write_project};

#[derive(Clone)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
    pub config_path: Option<PathBuf>,
}

const DEFAULT_OUTPUT_DIR: &str = "generated";

type Generation = GenerationService<OpenAiCompatibleClient, FileRoleModelRegistry>;
type EventSender = UnboundedSender<PipelineEvent>;

pub type Coordinator =
    GenerationCoordinator<OpenAiCompatibleClient, FileRoleModelRegistry, FilePromptRegistry, EventSender>;
pub type Scaffolder =
    ScaffoldingService<OpenAiCompatibleClient, FileRoleModelRegistry, FilePromptRegistry, EventSender>;
pub type FinalReviewer =
    FinalReviewService<OpenAiCompatibleClient, FileRoleModelRegistry, FilePromptRegistry, EventSender>;
pub type Tester =
    TestGenerationService<OpenAiCompatibleClient, FileRoleModelRegistry, FilePromptRegistry, EventSender>;

fn load_app_config(config: &Config) -> Result<AppConfig> {
    let app = AppConfig::load(config.config_path.as_deref()).context("Failed to load configuration")?;
    if config.verbose {
        println!(
            "Using roles from {} and prompts from {}",
            app.roles_path.display(),
            app.prompts_dir.display()
        );
    }
    Ok(app)
}

/// Registries, client and generation service, built once and shared
fn build_generation(app: &AppConfig) -> Arc<Generation> {
    let roles = FileRoleModelRegistry::new(Some(app.roles_path.clone()));
    let client = OpenAiCompatibleClient::new(app.providers.clone());
    Arc::new(GenerationService::new(client, roles).with_cache_dir(app.cache_dir.clone()))
}

/// Composition root: every collaborator is fully built before it is injected
pub fn build_coordinator(app: &AppConfig, events: EventSender) -> Coordinator {
    let generation = build_generation(app);
    let prompts = FilePromptRegistry::new(Some(app.prompts_dir.clone()));
    GenerationCoordinator::new(generation, prompts, events, app.pipeline_settings())
}

pub fn build_scaffolder(app: &AppConfig, events: EventSender) -> Scaffolder {
    let generation = build_generation(app);
    let prompts = FilePromptRegistry::new(Some(app.prompts_dir.clone()));
    ScaffoldingService::new(generation, prompts, events)
}

pub fn build_final_reviewer(app: &AppConfig, events: EventSender) -> FinalReviewer {
    let generation = build_generation(app);
    let prompts = FilePromptRegistry::new(Some(app.prompts_dir.clone()));
    FinalReviewService::new(generation, prompts, events)
}

pub fn build_tester(app: &AppConfig, events: EventSender) -> Tester {
    let generation = build_generation(app);
    let prompts = FilePromptRegistry::new(Some(app.prompts_dir.clone()));
    TestGenerationService::new(generation, prompts, events)
}

fn spawn_progress(mut events: UnboundedReceiver<PipelineEvent>, verbose: bool) -> JoinHandle<ProgressIndicator> {
    tokio::spawn(async move {
        let mut progress = ProgressIndicator::new(verbose);
        while let Some(event) = events.recv().await {
            progress.handle(&event);
        }
        progress
    })
}

fn join_request(words: Vec<String>) -> Result<String> {
    let request = words.join(" ").trim().to_string();
    if request.is_empty() {
        anyhow::bail!("The request must not be empty");
    }
    Ok(request)
}

/// Runs the pipeline, then the optional final review; `events` is dropped
/// on return so the progress printer can finish.
async fn run_generation(
    app: &AppConfig,
    request: &GenerationRequest,
    final_review: bool,
    events: EventSender,
) -> Option<ProjectState> {
    let coordinator = build_coordinator(app, events.clone());
    let mut state = coordinator.coordinate_generation(request).await?;

    if final_review {
        let reviewer = build_final_reviewer(app, events);
        state.final_code = reviewer.execute(&request.prompt, &state.final_code).await;
    }
    Some(state)
}

pub async fn generate(
    words: Vec<String>,
    project: Option<PathBuf>,
    out: Option<PathBuf>,
    final_review: bool,
    config: &Config,
) -> Result<()> {
    let prompt = join_request(words)?;
    let app = load_app_config(config)?;

    let existing = match &project {
        Some(dir) => read_project(dir)
            .with_context(|| format!("Failed to read project {}", dir.display()))?,
        None => BTreeMap::new(),
    };
    let out_dir = out
        .or_else(|| project.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    println!("Generating: \"{}\"", prompt);
    if let Some(dir) = &project {
        println!("Using {} existing file(s) from {}", existing.len(), dir.display());
    }

    let request = GenerationRequest::new(prompt).with_existing_files(existing);
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress(rx, config.verbose);

    let result = run_generation(&app, &request, final_review, tx).await;

    let progress = printer.await.context("Progress reporting failed")?;
    progress.finish();

    let Some(state) = result else {
        anyhow::bail!("Generation failed; no files were written");
    };

    let manifest = RunManifest::from_state(&request.prompt, &state);
    let previous = RunManifest::load(&out_dir)?;
    let changed: BTreeMap<String, String> = manifest
        .changed_since(previous.as_ref())
        .into_iter()
        .chain(
            state
                .final_code
                .keys()
                .filter(|path| !out_dir.join(path.as_str()).exists())
                .cloned(),
        )
        .filter_map(|path| state.final_code.get(&path).map(|content| (path, content.clone())))
        .collect();

    if config.dry_run {
        println!(
            "[DRY RUN] Would write {} file(s) to {}",
            changed.len(),
            out_dir.display()
        );
        for path in changed.keys() {
            println!("  - {}", path);
        }
        return Ok(());
    }

    let written = write_project(&out_dir, &changed)?;
    manifest.save(&out_dir)?;
    println!(
        "✓ Wrote {} file(s) to {} ({} unchanged)",
        written,
        out_dir.display(),
        state.final_code.len() - written
    );
    Ok(())
}

pub async fn scaffold(words: Vec<String>, out: Option<PathBuf>, config: &Config) -> Result<()> {
    let prompt = join_request(words)?;
    let app = load_app_config(config)?;
    let out_dir = out.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    println!("Scaffolding: \"{}\"", prompt);
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress(rx, config.verbose);

    let result = {
        let scaffolder = build_scaffolder(&app, tx);
        scaffolder.execute(&prompt).await
    };
    printer.await.context("Progress reporting failed")?;

    let Some(files) = result else {
        anyhow::bail!("Scaffolding failed; no files were written");
    };

    if config.dry_run {
        println!("[DRY RUN] Would write {} file(s) to {}", files.len(), out_dir.display());
        return Ok(());
    }

    let written = write_project(&out_dir, &files)?;
    println!("✓ Wrote {} file(s) to {}", written, out_dir.display());
    Ok(())
}

pub async fn test(file: &Path, root: Option<PathBuf>, config: &Config) -> Result<()> {
    let app = load_app_config(config)?;
    let root = root.unwrap_or_else(|| PathBuf::from("."));
    let source = read_source(file)?;
    let source_path = file
        .strip_prefix(&root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/");

    println!("Generating tests for {}", source_path);
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress(rx, config.verbose);

    let generated = {
        let tester = build_tester(&app, tx);
        tester.generate_tests_for_file(&source_path, &source, None).await
    };
    printer.await.context("Progress reporting failed")?;

    if generated.is_empty() {
        anyhow::bail!("No tests were generated for {}", source_path);
    }

    let requirements_path = root.join("requirements.txt");
    let existing_requirements = fs::read_to_string(&requirements_path).unwrap_or_default();
    let extra: Vec<String> = generated
        .iter()
        .flat_map(|test| test.requirements.iter().cloned())
        .collect();

    let mut files: BTreeMap<String, String> = generated
        .into_iter()
        .map(|test| (test.path, test.content))
        .collect();
    let merged = merge_requirements(&existing_requirements, &extra);
    if merged != existing_requirements {
        files.insert("requirements.txt".to_string(), merged);
    }

    if config.dry_run {
        println!("[DRY RUN] Would write {} file(s) to {}", files.len(), root.display());
        for path in files.keys() {
            println!("  - {}", path);
        }
        return Ok(());
    }

    let written = write_project(&root, &files)?;
    println!("✓ Wrote {} file(s) to {}", written, root.display());
    Ok(())
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

pub fn scan(file: &Path) -> Result<()> {
    let structure = parse_structure(&read_source(file)?);
    println!(
        "{}",
        serde_json::to_string_pretty(&structure).context("Failed to serialize structure")?
    );
    Ok(())
}

pub fn extract(file: &Path, name: &str) -> Result<()> {
    match extract_code_block(&read_source(file)?, name) {
        Some(block) => {
            println!("{}", block);
            Ok(())
        }
        None => anyhow::bail!("'{}' is not defined in {}", name, file.display()),
    }
}

pub fn index(dir: &Path) -> Result<()> {
    let files = read_project(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    let index = build_index(&files);
    println!(
        "{}",
        serde_json::to_string_pretty(&index).context("Failed to serialize index")?
    );
    Ok(())
}
