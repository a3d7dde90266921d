use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Immutable input to one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user's natural-language request
    pub prompt: String,
    /// Pre-existing project files (relative path -> full source)
    #[serde(default)]
    pub existing_files: BTreeMap<String, String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            existing_files: BTreeMap::new(),
        }
    }

    pub fn with_existing_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.existing_files = files;
        self
    }
}

/// High-level plan produced by the architect's strategy stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Strategy {
    pub high_level_plan: String,
    /// Shared data-model declarations threaded into later prompts
    #[serde(rename = "pydantic_models", default, deserialize_with = "string_or_empty")]
    pub data_models: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Class,
    Function,
}

/// Specification of one public member of a planned file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMemberSpec")]
pub struct MemberSpec {
    #[serde(rename = "type")]
    pub kind: MemberKind,
    pub name: String,
    pub signature: String,
    pub docstring: String,
    pub implementation_notes: Vec<String>,
}

/// Planners sometimes list bare signatures instead of member objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMemberSpec {
    Full {
        #[serde(rename = "type", default)]
        kind: Option<MemberKind>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        signature: String,
        #[serde(default, deserialize_with = "string_or_empty")]
        docstring: String,
        #[serde(default, deserialize_with = "string_or_list")]
        implementation_notes: Vec<String>,
    },
    Signature(String),
}

impl From<RawMemberSpec> for MemberSpec {
    fn from(raw: RawMemberSpec) -> Self {
        match raw {
            RawMemberSpec::Full {
                kind,
                name,
                signature,
                docstring,
                implementation_notes,
            } => {
                let kind = kind.unwrap_or_else(|| infer_kind(&signature));
                let name = if name.is_empty() {
                    name_from_signature(&signature).unwrap_or_default()
                } else {
                    name
                };
                MemberSpec {
                    kind,
                    name,
                    signature,
                    docstring,
                    implementation_notes,
                }
            }
            RawMemberSpec::Signature(signature) => MemberSpec {
                kind: infer_kind(&signature),
                name: name_from_signature(&signature).unwrap_or_default(),
                signature,
                docstring: String::new(),
                implementation_notes: Vec::new(),
            },
        }
    }
}

fn infer_kind(signature: &str) -> MemberKind {
    if signature.trim_start().starts_with("class ") {
        MemberKind::Class
    } else {
        MemberKind::Function
    }
}

fn name_from_signature(signature: &str) -> Option<String> {
    let rest = signature
        .trim_start()
        .trim_start_matches("async ")
        .trim_start_matches("def ")
        .trim_start_matches("class ");
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

impl MemberSpec {
    /// Renders the member the way coder prompts present it
    pub fn render(&self) -> String {
        let mut out = if self.signature.is_empty() {
            match self.kind {
                MemberKind::Class => format!("class {}", self.name),
                MemberKind::Function => format!("def {}(...)", self.name),
            }
        } else {
            self.signature.clone()
        };
        if !self.docstring.is_empty() {
            out.push_str(&format!("\n    \"\"\"{}\"\"\"", self.docstring.trim()));
        }
        if !self.implementation_notes.is_empty() {
            out.push_str("\n    Implementation notes:");
            for note in &self.implementation_notes {
                out.push_str(&format!("\n    - {}", note.trim()));
            }
        }
        out
    }
}

/// One entry of the interface contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSpec {
    pub file: String,
    #[serde(default = "default_purpose", deserialize_with = "string_or_empty")]
    pub purpose: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub imports: Vec<String>,
    #[serde(default)]
    pub public_members: Vec<MemberSpec>,
}

fn default_purpose() -> String {
    "No purpose defined.".to_string()
}

impl FileSpec {
    pub fn render_members(&self) -> String {
        if self.public_members.is_empty() {
            return "# No public members specified.".to_string();
        }
        self.public_members
            .iter()
            .map(MemberSpec::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn render_imports(&self) -> String {
        if self.imports.is_empty() {
            "None".to_string()
        } else {
            self.imports.join("\n")
        }
    }
}

/// Ordered per-file plan; order is generation order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceContract {
    pub files: Vec<FileSpec>,
}

impl InterfaceContract {
    /// Builds a contract from the planner's parsed JSON.
    ///
    /// Accepts either `{"interface_contract": [...]}` or a bare list. Entries
    /// without a usable `file` are dropped, as are repeated file names after
    /// their first occurrence.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let items = match value {
            serde_json::Value::Object(map) => map.get("interface_contract")?.as_array()?,
            serde_json::Value::Array(items) => items,
            _ => return None,
        };

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for item in items {
            let spec: FileSpec = match serde_json::from_value(item.clone()) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!("Dropping malformed contract entry: {}", e);
                    continue;
                }
            };
            let file = spec.file.trim().to_string();
            if file.is_empty() {
                continue;
            }
            if !seen.insert(file.clone()) {
                tracing::warn!("Dropping duplicate contract entry for {}", file);
                continue;
            }
            files.push(FileSpec { file, ..spec });
        }

        Some(Self { files })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.file.clone()).collect()
    }

    /// Renders the public members of every file except `target_file`, so a
    /// coder can call sibling APIs without seeing their source.
    pub fn interface_context_for(&self, target_file: &str) -> String {
        let blocks: Vec<String> = self
            .files
            .iter()
            .filter(|f| f.file != target_file && !f.public_members.is_empty())
            .map(|f| {
                let members = f
                    .public_members
                    .iter()
                    .map(|m| {
                        let sig = if m.signature.is_empty() {
                            m.name.as_str()
                        } else {
                            m.signature.as_str()
                        };
                        format!("    # {}", sig)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("  # From {}:\n{}", f.file, members)
            })
            .collect();

        if blocks.is_empty() {
            "# No other interfaces defined.".to_string()
        } else {
            format!("class ProjectInterfaces:\n{}", blocks.join("\n\n"))
        }
    }
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => s.lines().map(|l| l.to_string()).collect(),
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
