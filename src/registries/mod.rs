mod http_model_client;
mod prompt_registry;
mod role_model_registry;

pub use http_model_client::OpenAiCompatibleClient;
pub use prompt_registry::{BuiltinPromptRegistry, FilePromptRegistry};
pub use role_model_registry::{FileRoleModelRegistry, StaticRoleModelRegistry};
