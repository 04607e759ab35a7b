//! Authorization-model DSL parser
//!
//! Parses the human-readable schema language into the structured
//! [`AuthorizationSchema`] the engine stores and evaluates:
//!
//! ```text
//! model
//!   schema 1.1
//!
//! type user
//! type document
//!   relations
//!     define viewer: [user] or editor
//!     define editor: [user]
//! ```
//!
//! A relation definition is a union of direct subject types (`[user]`)
//! and computed usersets (`editor`). Intersection and exclusion are not
//! part of this language subset and are rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EmbedError, Result};

/// A parsed authorization model schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSchema {
    /// Schema language version, e.g. "1.1"
    pub schema_version: String,
    /// Object type definitions, in declaration order
    pub type_definitions: Vec<TypeDefinition>,
}

impl AuthorizationSchema {
    /// Look up a type definition by name
    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.type_definitions.iter().find(|t| t.name == name)
    }
}

/// An object type and its relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type name, e.g. "document"
    pub name: String,
    /// Relations defined on this type, keyed by relation name
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
}

/// A relation definition: a union of direct assignments and computed usersets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Subject types that may be directly assigned, e.g. `[user]`
    #[serde(default)]
    pub direct_types: Vec<String>,
    /// Other relations on the same type this relation derives from,
    /// e.g. `viewer` derived from `editor`
    #[serde(default)]
    pub computed: Vec<String>,
}

/// Parse DSL text into a structured schema.
///
/// Fails with [`EmbedError::ModelParseError`] on malformed input; never
/// retried by callers.
pub fn parse(text: &str) -> Result<AuthorizationSchema> {
    let mut schema_version = String::from("1.1");
    let mut type_definitions: Vec<TypeDefinition> = Vec::new();
    let mut in_relations = false;

    for (lineno, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if line == "model" {
            continue;
        }
        if let Some(version) = line.strip_prefix("schema ") {
            schema_version = version.trim().to_string();
            continue;
        }
        if let Some(name) = line.strip_prefix("type ") {
            let name = name.trim();
            if !is_identifier(name) {
                return Err(parse_error(lineno, format!("invalid type name '{name}'")));
            }
            if type_definitions.iter().any(|t| t.name == name) {
                return Err(parse_error(lineno, format!("duplicate type '{name}'")));
            }
            type_definitions.push(TypeDefinition {
                name: name.to_string(),
                relations: BTreeMap::new(),
            });
            in_relations = false;
            continue;
        }
        if line == "relations" {
            if type_definitions.is_empty() {
                return Err(parse_error(lineno, "'relations' outside a type block"));
            }
            in_relations = true;
            continue;
        }
        if let Some(def) = line.strip_prefix("define ") {
            if !in_relations {
                return Err(parse_error(lineno, "'define' outside a relations block"));
            }
            let (name, expr) = def.split_once(':').ok_or_else(|| {
                parse_error(lineno, "expected 'define <relation>: <expression>'")
            })?;
            let name = name.trim();
            if !is_identifier(name) {
                return Err(parse_error(lineno, format!("invalid relation name '{name}'")));
            }
            let relation = parse_expression(lineno, expr)?;
            let current = match type_definitions.last_mut() {
                Some(t) => t,
                None => return Err(parse_error(lineno, "'define' outside a type block")),
            };
            if current.relations.insert(name.to_string(), relation).is_some() {
                return Err(parse_error(lineno, format!("duplicate relation '{name}'")));
            }
            continue;
        }

        return Err(parse_error(lineno, format!("unrecognized line '{line}'")));
    }

    if type_definitions.is_empty() {
        return Err(EmbedError::ModelParseError(
            "model defines no types".to_string(),
        ));
    }

    let schema = AuthorizationSchema {
        schema_version,
        type_definitions,
    };
    validate(&schema)?;
    Ok(schema)
}

/// Parse a relation expression: terms joined by `or`.
///
/// A `[a, b]` term lists directly assignable subject types; a bare
/// identifier names a computed userset on the same type.
fn parse_expression(lineno: usize, expr: &str) -> Result<RelationDef> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(parse_error(lineno, "empty relation expression"));
    }
    if expr.contains(" and ") || expr.contains(" but not ") {
        return Err(parse_error(
            lineno,
            "only union ('or') expressions are supported",
        ));
    }

    let mut relation = RelationDef::default();
    for term in expr.split(" or ") {
        let term = term.trim();
        if let Some(types) = term.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            for subject_type in types.split(',') {
                let subject_type = subject_type.trim();
                if !is_identifier(subject_type) {
                    return Err(parse_error(
                        lineno,
                        format!("invalid subject type '{subject_type}'"),
                    ));
                }
                relation.direct_types.push(subject_type.to_string());
            }
        } else if is_identifier(term) {
            relation.computed.push(term.to_string());
        } else {
            return Err(parse_error(lineno, format!("invalid term '{term}'")));
        }
    }
    Ok(relation)
}

/// Reject dangling references: computed usersets must name a relation on
/// the same type, and direct subject types must be declared types.
fn validate(schema: &AuthorizationSchema) -> Result<()> {
    for type_def in &schema.type_definitions {
        for (name, relation) in &type_def.relations {
            for computed in &relation.computed {
                if !type_def.relations.contains_key(computed) {
                    return Err(EmbedError::ModelParseError(format!(
                        "relation '{}' on type '{}' references undefined relation '{}'",
                        name, type_def.name, computed
                    )));
                }
            }
            for direct in &relation.direct_types {
                if schema.type_definition(direct).is_none() {
                    return Err(EmbedError::ModelParseError(format!(
                        "relation '{}' on type '{}' references undeclared type '{}'",
                        name, type_def.name, direct
                    )));
                }
            }
        }
    }
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_error(lineno: usize, message: impl std::fmt::Display) -> EmbedError {
    EmbedError::ModelParseError(format!("line {}: {}", lineno + 1, message))
}
