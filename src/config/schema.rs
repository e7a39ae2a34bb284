use crate::rule::{TextPattern, TransformationRule};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    /// Structural checks only. Regex syntax is checked when a patch runs so
    /// that one bad pattern cannot stop unrelated patches.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        if let Some(marker) = &self.meta.root_marker {
            if !is_tree_relative(marker) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: None,
                    message: format!("root_marker '{marker}' must be a relative path"),
                });
            }
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(patch.id.clone()));
            }

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "file",
                });
            } else if !is_tree_relative(&patch.file) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: format!(
                        "file '{}' must be relative to the tree root without '..'",
                        patch.file
                    ),
                });
            }

            match &patch.operation {
                Operation::Author { .. } => {}
                Operation::Rewrite {
                    rules,
                    applied_marker,
                } => {
                    if rules.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "operation.rules",
                        });
                    }
                    if applied_marker.as_deref().is_some_and(|m| m.is_empty()) {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "operation.applied_marker",
                        });
                    }
                    for rule in rules {
                        if let Some(field) = rule.missing_field() {
                            issues.push(ValidationIssue::MissingField {
                                patch_id: Some(patch.id.clone()),
                                field,
                            });
                        }
                    }
                }
                Operation::AppendGuarded { marker, fragment } => {
                    if marker.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "operation.marker",
                        });
                    }
                    if fragment.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "operation.fragment",
                        });
                    } else if !marker.is_empty() && !fragment.contains(marker.as_str()) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: Some(patch.id.clone()),
                            message: "fragment must contain its marker or it would be appended on every run"
                                .to_string(),
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn is_tree_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Relative path that only exists inside a valid tree root
    #[serde(default)]
    pub root_marker: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    /// Target path relative to the tree root
    pub file: String,
    #[serde(default)]
    pub description: Option<String>,
    pub operation: Operation,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Synthesize a whole file
    Author { content: String },
    /// Rewrite an existing file with ordered rules
    Rewrite {
        rules: Vec<RuleDefinition>,
        #[serde(default)]
        applied_marker: Option<String>,
    },
    /// Append a fragment unless its marker is already present
    AppendGuarded { marker: String, fragment: String },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Author { .. } => "author",
            Operation::Rewrite { .. } => "rewrite",
            Operation::AppendGuarded { .. } => "append-guarded",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleDefinition {
    Literal {
        name: String,
        search: String,
        #[serde(default)]
        replace: String,
    },
    Regex {
        name: String,
        pattern: String,
        #[serde(default)]
        replace: String,
    },
    /// Remove (or replace) a brace-delimited block
    Block {
        name: String,
        header: String,
        indent: usize,
        #[serde(default)]
        replace: String,
    },
}

impl RuleDefinition {
    pub fn name(&self) -> &str {
        match self {
            RuleDefinition::Literal { name, .. }
            | RuleDefinition::Regex { name, .. }
            | RuleDefinition::Block { name, .. } => name,
        }
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.name().trim().is_empty() {
            return Some("rules.name");
        }
        match self {
            RuleDefinition::Literal { search, .. } if search.is_empty() => Some("rules.search"),
            RuleDefinition::Regex { pattern, .. } if pattern.is_empty() => Some("rules.pattern"),
            RuleDefinition::Block { header, .. } if header.trim().is_empty() => {
                Some("rules.header")
            }
            _ => None,
        }
    }

    pub fn to_rule(&self) -> TransformationRule {
        let (name, pattern, replacement) = match self {
            RuleDefinition::Literal {
                name,
                search,
                replace,
            } => (name, TextPattern::Literal(search.clone()), replace),
            RuleDefinition::Regex {
                name,
                pattern,
                replace,
            } => (name, TextPattern::Regex(pattern.clone()), replace),
            RuleDefinition::Block {
                name,
                header,
                indent,
                replace,
            } => (
                name,
                TextPattern::Block {
                    header: header.clone(),
                    indent: *indent,
                },
                replace,
            ),
        };
        TransformationRule {
            name: name.clone(),
            pattern,
            replacement: replacement.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    DuplicateId(String),
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::DuplicateId(id) => write!(f, "patch id '{id}' is used more than once"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch set: {message}"),
            },
        }
    }
}
