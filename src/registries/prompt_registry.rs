use crate::contexts::{PopulateError, PromptRegistry};
use std::fs;
use std::path::PathBuf;

/// Templates compiled into the binary, keyed by name
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("architect_strategy", include_str!("../../prompts/architect_strategy.yml")),
    ("architect_contract", include_str!("../../prompts/architect_contract.yml")),
    ("coder", include_str!("../../prompts/coder.yml")),
    ("corrector", include_str!("../../prompts/corrector.yml")),
    ("reviewer", include_str!("../../prompts/reviewer.yml")),
    ("scaffold", include_str!("../../prompts/scaffold.yml")),
    ("tester", include_str!("../../prompts/tester.yml")),
    ("final_review", include_str!("../../prompts/final_review.yml")),
];

/// Serves the templates shipped with the crate
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinPromptRegistry;

impl PromptRegistry for BuiltinPromptRegistry {
    fn get_template(&self, name: &str) -> Result<String, PopulateError> {
        let (_, content) = BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| PopulateError::TemplateNotFound(name.to_string()))?;
        extract_template(content)
    }
}

/// File-based implementation of PromptRegistry
/// Loads `template:` from `{prompts_dir}/{name}.yml`, falling back to the
/// built-in template when the file does not exist
#[derive(Clone)]
pub struct FilePromptRegistry {
    prompts_dir: PathBuf,
}

impl FilePromptRegistry {
    /// Creates a new FilePromptRegistry
    ///
    /// # Arguments
    /// * `prompts_dir` - Optional path to the templates directory (defaults to "prompts")
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.unwrap_or_else(|| PathBuf::from("prompts")),
        }
    }
}

impl PromptRegistry for FilePromptRegistry {
    fn get_template(&self, name: &str) -> Result<String, PopulateError> {
        let template_path = self.prompts_dir.join(format!("{}.yml", name));

        if !template_path.exists() {
            tracing::debug!("No {} on disk, using built-in template", template_path.display());
            return BuiltinPromptRegistry.get_template(name);
        }

        fs::read_to_string(&template_path)
            .map_err(|e| {
                PopulateError::InvalidTemplate(format!(
                    "Failed to read prompt template {}: {}",
                    template_path.display(),
                    e
                ))
            })
            .and_then(|content| extract_template(&content))
    }
}

/// Extracts the `template` field from a YAML prompt file
fn extract_template(yaml_content: &str) -> Result<String, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidTemplate(format!("Invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(PopulateError::InvalidTemplate("Empty YAML document".to_string()));
    };

    doc["template"]
        .as_str()
        .map(|template| template.to_string())
        .ok_or_else(|| {
            PopulateError::InvalidTemplate("No template field found in prompt file".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_template() {
        let yaml = r#"
template: |
  Hello {{input.name}}
"#;
        assert_eq!(extract_template(yaml).unwrap(), "Hello {{input.name}}\n");
    }

    #[test]
    fn test_extract_template_missing_field() {
        assert!(matches!(
            extract_template("system_prompt: hi"),
            Err(PopulateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn every_builtin_template_loads() {
        for (name, _) in BUILTIN_TEMPLATES {
            let template = BuiltinPromptRegistry.get_template(name).unwrap();
            assert!(template.contains("{{input.user_request"), "{}", name);
        }
        let tester = BuiltinPromptRegistry.get_template("tester").unwrap();
        assert!(tester.contains("{{input.function_code}}"));
        assert_eq!(
            BuiltinPromptRegistry.get_template("planner"),
            Err(PopulateError::TemplateNotFound("planner".to_string()))
        );
    }

    #[test]
    fn file_registry_prefers_disk_then_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("coder.yml"), "template: custom {{input.target_file}}").unwrap();
        let registry = FilePromptRegistry::new(Some(dir.path().to_path_buf()));

        assert_eq!(registry.get_template("coder").unwrap(), "custom {{input.target_file}}");
        assert!(registry.get_template("reviewer").unwrap().contains("`approved`"));
    }
}
