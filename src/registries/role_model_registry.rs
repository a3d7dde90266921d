use crate::contexts::{ExecutionError, Model, Role, RoleModelRegistry};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Key whose binding applies to every role not listed explicitly
const DEFAULT_KEY: &str = "default";

/// File-based implementation of RoleModelRegistry
/// Loads role-to-model bindings from a YAML file
#[derive(Clone)]
pub struct FileRoleModelRegistry {
    registry_path: PathBuf,
}

impl FileRoleModelRegistry {
    /// Creates a new FileRoleModelRegistry
    ///
    /// # Arguments
    /// * `registry_path` - Optional path to registry file (defaults to "agents/role_model_registry.yml")
    pub fn new(registry_path: Option<PathBuf>) -> Self {
        Self {
            registry_path: registry_path
                .unwrap_or_else(|| PathBuf::from("agents/role_model_registry.yml")),
        }
    }

    /// Loads the registry from the file; a missing file binds nothing
    fn load_registry(&self) -> Result<HashMap<String, Model>, ExecutionError> {
        if !self.registry_path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.registry_path).map_err(|e| {
            ExecutionError::RegistryFailed(format!(
                "Failed to read {}: {}",
                self.registry_path.display(),
                e
            ))
        })?;

        parse_registry(&content)
    }
}

impl RoleModelRegistry for FileRoleModelRegistry {
    fn get_model(&self, role: Role) -> Result<Option<Model>, ExecutionError> {
        let registry = self.load_registry()?;
        Ok(registry
            .get(role.as_str())
            .or_else(|| registry.get(DEFAULT_KEY))
            .cloned())
    }
}

/// In-memory bindings, for tests and programmatic setups
#[derive(Clone, Debug, Default)]
pub struct StaticRoleModelRegistry {
    models: HashMap<Role, Model>,
}

impl StaticRoleModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: Role, model: Model) -> Self {
        self.models.insert(role, model);
        self
    }

    /// Binds every role to the same model
    pub fn uniform(model: Model) -> Self {
        Role::ALL
            .into_iter()
            .fold(Self::new(), |registry, role| registry.with(role, model.clone()))
    }
}

impl RoleModelRegistry for StaticRoleModelRegistry {
    fn get_model(&self, role: Role) -> Result<Option<Model>, ExecutionError> {
        Ok(self.models.get(&role).cloned())
    }
}

/// Parses the YAML registry file into a HashMap
/// Supports `provider/model` shorthand and `{ provider, model }` objects
fn parse_registry(yaml_content: &str) -> Result<HashMap<String, Model>, ExecutionError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| ExecutionError::RegistryFailed(format!("Invalid registry YAML: {}", e)))?;

    if docs.is_empty() {
        return Ok(HashMap::new());
    }

    let doc = &docs[0];
    let mut registry = HashMap::new();

    if let Some(hash) = doc.as_hash() {
        for (key, value) in hash {
            let Some(k) = key.as_str() else {
                continue;
            };

            let model = if let Some(v_str) = value.as_str() {
                parse_shorthand(v_str)
            } else if let Some(v_hash) = value.as_hash() {
                let field = |name: &str| {
                    v_hash
                        .get(&yaml_rust::Yaml::String(name.to_string()))
                        .and_then(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                };
                match (field("provider"), field("model")) {
                    (Some(provider), Some(name)) => Some(Model { provider, name }),
                    _ => None,
                }
            } else {
                None
            };

            match model {
                Some(model) => {
                    registry.insert(k.trim().to_lowercase(), model);
                }
                None => tracing::warn!("Ignoring unusable model binding for '{}'", k),
            }
        }
    }

    Ok(registry)
}

/// `provider/model`; the model part may itself contain slashes
fn parse_shorthand(value: &str) -> Option<Model> {
    let (provider, name) = value.trim().split_once('/')?;
    if provider.is_empty() || name.is_empty() {
        return None;
    }
    Some(Model::new(provider, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_registry_shorthand() {
        let yaml = r#"
architect: openai/gpt-4o
coder: ollama/qwen2.5-coder:14b
reviewer: deepseek/deepseek-chat
"#;

        let registry = parse_registry(yaml).unwrap();
        assert_eq!(registry.get("architect"), Some(&Model::new("openai", "gpt-4o")));
        assert_eq!(
            registry.get("coder"),
            Some(&Model::new("ollama", "qwen2.5-coder:14b"))
        );
    }

    #[test]
    fn test_parse_registry_object_format() {
        let yaml = r#"
reviewer:
  provider: openai
  model: meta-llama/llama-3-70b
tester:
  model: missing-provider
"#;

        let registry = parse_registry(yaml).unwrap();
        assert_eq!(
            registry.get("reviewer"),
            Some(&Model::new("openai", "meta-llama/llama-3-70b"))
        );
        assert!(registry.get("tester").is_none());
    }

    #[test]
    fn test_parse_empty_registry() {
        assert!(parse_registry("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(matches!(
            parse_registry("coder: [unclosed"),
            Err(ExecutionError::RegistryFailed(_))
        ));
    }

    #[test]
    fn file_registry_falls_back_to_default_entry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default: openai/gpt-4o-mini\ncoder: openai/gpt-4o").unwrap();
        let registry = FileRoleModelRegistry::new(Some(file.path().to_path_buf()));

        assert_eq!(
            registry.get_model(Role::Coder).unwrap(),
            Some(Model::new("openai", "gpt-4o"))
        );
        assert_eq!(
            registry.get_model(Role::Tester).unwrap(),
            Some(Model::new("openai", "gpt-4o-mini"))
        );
    }

    #[test]
    fn missing_file_leaves_roles_unbound() {
        let registry = FileRoleModelRegistry::new(Some(PathBuf::from("/nonexistent/roles.yml")));
        assert_eq!(registry.get_model(Role::Architect).unwrap(), None);
    }

    #[test]
    fn static_registry_binds_only_listed_roles() {
        let registry = StaticRoleModelRegistry::new().with(Role::Coder, Model::new("ollama", "llama3"));
        assert!(registry.get_model(Role::Coder).unwrap().is_some());
        assert!(registry.get_model(Role::Reviewer).unwrap().is_none());

        let uniform = StaticRoleModelRegistry::uniform(Model::new("ollama", "llama3"));
        assert!(Role::ALL.iter().all(|r| uniform.get_model(*r).unwrap().is_some()));
    }
}
