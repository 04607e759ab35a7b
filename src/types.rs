//! Core types shared across the bootstrap and provisioning pipeline

use serde::{Deserialize, Serialize};

use crate::dsl::AuthorizationSchema;
use crate::error::{EmbedError, Result};

/// A named, isolated namespace of facts and models inside the engine.
///
/// Created once per logical deployment and looked up by name on every
/// subsequent boot. The id is engine-assigned and stable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    /// Human-chosen, unique store name
    pub name: String,
    /// Engine-assigned identifier
    pub id: String,
}

/// An authorization model bound to a store.
///
/// One active model per store: the first model listed is the active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Engine-assigned identifier
    pub id: String,
    /// Owning store
    pub store_id: String,
    /// The structured schema this model was written with
    pub schema: AuthorizationSchema,
}

/// A single access-control statement: `(object, relation, subject)`.
///
/// Object and subject are opaque identifiers in `type:id` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// Target object, e.g. `document:1`
    pub object: String,
    /// Relation name, e.g. `viewer`
    pub relation: String,
    /// Subject holding the relation, e.g. `user:alice`
    pub subject: String,
}

impl Fact {
    /// Create a new fact
    pub fn new(
        object: impl Into<String>,
        relation: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            subject: subject.into(),
        }
    }

    /// Type prefix of the object identifier, e.g. `document` for `document:1`
    pub fn object_type(&self) -> Result<&str> {
        split_typed_id(&self.object)
            .map(|(t, _)| t)
            .ok_or_else(|| {
                EmbedError::EvaluationError(format!(
                    "object '{}' is not in type:id form",
                    self.object
                ))
            })
    }

    /// Type prefix of the subject identifier
    pub fn subject_type(&self) -> Result<&str> {
        split_typed_id(&self.subject)
            .map(|(t, _)| t)
            .ok_or_else(|| {
                EmbedError::EvaluationError(format!(
                    "subject '{}' is not in type:id form",
                    self.subject
                ))
            })
    }

    /// Validate `type:id` form on object and subject and a non-empty relation
    pub(crate) fn validate(&self) -> Result<()> {
        if split_typed_id(&self.object).is_none() {
            return Err(EmbedError::ConfigInvalid(format!(
                "fact object '{}' must be in type:id form",
                self.object
            )));
        }
        if split_typed_id(&self.subject).is_none() {
            return Err(EmbedError::ConfigInvalid(format!(
                "fact subject '{}' must be in type:id form",
                self.subject
            )));
        }
        if self.relation.trim().is_empty() {
            return Err(EmbedError::ConfigInvalid(
                "fact relation must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn split_typed_id(id: &str) -> Option<(&str, &str)> {
    let (t, rest) = id.split_once(':')?;
    if t.is_empty() || rest.is_empty() {
        return None;
    }
    Some((t, rest))
}

/// Why a readiness probe reported not-ready.
///
/// The probe returns a structured reason so the migration trigger can
/// switch on it instead of sniffing free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyReason {
    /// The target is usable
    Ready,
    /// The datastore schema is absent or outdated and requires migration
    SchemaMissing,
    /// The target could not be reached
    Unreachable,
    /// Not ready for an unclassified reason
    Unknown,
}

/// Transient result of a readiness probe; polled, never persisted
#[derive(Debug, Clone)]
pub struct ReadinessReport {
    /// Whether the target is usable
    pub ready: bool,
    /// Structured not-ready reason
    pub reason: ReadyReason,
    /// Human-readable diagnostic, carried into timeout errors
    pub message: String,
}

impl ReadinessReport {
    /// A ready report
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: ReadyReason::Ready,
            message: String::new(),
        }
    }

    /// A not-ready report with a reason and diagnostic message
    pub fn not_ready(reason: ReadyReason, message: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_validation() {
        assert!(Fact::new("document:1", "viewer", "user:alice")
            .validate()
            .is_ok());
        assert!(Fact::new("document", "viewer", "user:alice")
            .validate()
            .is_err());
        assert!(Fact::new("document:1", "", "user:alice").validate().is_err());
        assert!(Fact::new("document:1", "viewer", ":alice")
            .validate()
            .is_err());
    }

    #[test]
    fn test_object_type() {
        let fact = Fact::new("document:1", "viewer", "user:alice");
        assert_eq!(fact.object_type().unwrap(), "document");
        assert_eq!(fact.subject_type().unwrap(), "user");
    }
}
