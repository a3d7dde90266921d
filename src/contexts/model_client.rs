use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display prefix kept for consumers that show model failures as text
pub const LLM_API_ERROR: &str = "LLM_API_ERROR";

/// A named model configuration slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Architect,
    Coder,
    Reviewer,
    Tester,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Architect, Role::Coder, Role::Reviewer, Role::Tester];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Coder => "coder",
            Role::Reviewer => "reviewer",
            Role::Tester => "tester",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// A concrete model bound to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub provider: String,
    pub name: String,
}

impl Model {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}

/// Errors that can occur while resolving or calling a model
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    NoModelForRole(Role),
    UnknownProvider(String),
    RegistryFailed(String),
    ExecutionFailed(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: ", LLM_API_ERROR)?;
        match self {
            ExecutionError::NoModelForRole(role) => {
                write!(f, "No model configured for role '{}'", role)
            }
            ExecutionError::UnknownProvider(provider) => {
                write!(f, "Provider '{}' is not configured", provider)
            }
            ExecutionError::RegistryFailed(details) => {
                write!(f, "Role model registry failed: {}", details)
            }
            ExecutionError::ExecutionFailed(details) => {
                write!(f, "Model call failed: {}", details)
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Live chunks of one model response; the first `Err` ends the stream
pub type ChunkStream = BoxStream<'static, Result<String, ExecutionError>>;

/// Trait for resolving the model bound to a role
pub trait RoleModelRegistry: Send + Sync {
    /// `Ok(None)` means the role is deliberately unbound
    fn get_model(&self, role: Role) -> Result<Option<Model>, ExecutionError>;
}

/// Trait for the transport that actually talks to a model
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_chat(
        &self,
        model: &Model,
        prompt: &str,
        role: Role,
    ) -> Result<ChunkStream, ExecutionError>;
}
