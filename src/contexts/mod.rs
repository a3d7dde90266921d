mod code_extractor;
mod code_sanitizer;
mod file_cache;
mod final_review;
mod generation_coordinator;
mod generation_service;
mod import_fixer;
mod model_client;
mod prompt_template;
mod response_validator;
mod scaffolding;
mod structure_scanner;
mod symbol_indexer;
mod test_generation;

pub use code_extractor::extract_code_block;
pub use code_sanitizer::sanitize_code_output;
pub use file_cache::{DEFAULT_CACHE_DIR, FileCache, hash_key};
pub use final_review::{
    EditError, FinalReviewService, LineEdit, apply_line_edit, apply_line_edits, render_numbered_files,
};
pub use generation_coordinator::{GenerationCoordinator, PipelineError, PipelineSettings};
pub use generation_service::GenerationService;
pub use import_fixer::fix_imports;
pub use model_client::{
    ChunkStream, ExecutionError, LLM_API_ERROR, Model, ModelClient, Role, RoleModelRegistry,
};
pub use prompt_template::{PopulateError, PromptRegistry, populate};
pub use response_validator::{
    clean_scaffold_paths, extract_and_parse_json, extract_json_from_tag,
    validate_and_flatten_scaffold,
};
pub use scaffolding::ScaffoldingService;
pub use structure_scanner::{CodeStructure, parse_structure, render_project_summary};
pub use symbol_indexer::{build_index, get_symbols_from_content, is_python_module, module_path_for};
pub use test_generation::{GeneratedTest, TestGenerationService, merge_requirements};
