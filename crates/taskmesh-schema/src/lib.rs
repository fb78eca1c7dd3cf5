// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-schema
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! A validator registry over a directory of `*.schema.json` files.
//!
//! Schemas may `$ref` one another by `$id`; every schema under the base
//! directory is loaded up front into a local document store so that
//! resolution never reaches the network: cross-schema `$ref` is
//! supported by a local document store, with no network fetch.
//!
//! Building a [`jsonschema::Validator`] can fail — a malformed schema
//! file, an unsupported draft. Since schema validation is optional,
//! that failure must not halt the caller: [`SchemaRegistry::validate`]
//! falls back to checking that the instance is a JSON object containing
//! every one of the schema's declared `required` top-level keys.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

/// The outcome of validating a document against a named schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The document validated successfully (by the real validator or the
    /// required-keys fallback).
    Valid,
    /// The document failed validation, with human-readable messages.
    Invalid(Vec<String>),
    /// No schema by that name is known; callers should treat this the
    /// same as `Valid` since validation is optional and can't reject
    /// what it can't find.
    Unknown,
}

impl ValidationOutcome {
    /// Whether this outcome should block the caller from proceeding.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// A registry of schemas loaded from a base directory.
pub struct SchemaRegistry {
    base_dir: PathBuf,
    /// Raw schema documents keyed by file stem (e.g. `"message_envelope"`
    /// for `message_envelope.schema.json`).
    documents_by_stem: HashMap<String, Value>,
    /// The same documents additionally keyed by declared `$id`, for
    /// cross-schema `$ref` resolution.
    documents_by_id: HashMap<String, Value>,
}

impl SchemaRegistry {
    /// Load every `*.schema.json` file directly under `base_dir`.
    ///
    /// Returns an empty registry (not an error) if `base_dir` does not
    /// exist — schema validation is optional, and an absent schemas
    /// directory simply means every [`Self::validate`] call falls back
    /// to the required-keys check.
    pub fn load(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut documents_by_stem = HashMap::new();
        let mut documents_by_id = HashMap::new();
        if base_dir.exists() {
            for entry in fs::read_dir(&base_dir)
                .with_context(|| format!("listing schema directory {base_dir:?}"))?
            {
                let entry = entry?;
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.ends_with(".schema.json") {
                    continue;
                }
                let stem = name.trim_end_matches(".schema.json").to_string();
                let Ok(bytes) = fs::read(&path) else { continue };
                let Ok(doc): std::result::Result<Value, _> = serde_json::from_slice(&bytes) else {
                    tracing::warn!(schema = %name, "schema file is not valid JSON, skipping");
                    continue;
                };
                if let Some(id) = doc.get("$id").and_then(Value::as_str) {
                    documents_by_id.insert(id.to_string(), doc.clone());
                }
                documents_by_stem.insert(stem, doc);
            }
        }
        Ok(Self {
            base_dir,
            documents_by_stem,
            documents_by_id,
        })
    }

    /// The base directory schemas were (or would be) loaded from.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate `instance` against the schema named `stem` (e.g.
    /// `"message_envelope"` for `message_envelope.schema.json`).
    #[must_use]
    pub fn validate(&self, stem: &str, instance: &Value) -> ValidationOutcome {
        let Some(schema) = self.documents_by_stem.get(stem) else {
            return ValidationOutcome::Unknown;
        };
        match self.compile(schema) {
            Ok(validator) => {
                let errors: Vec<String> = validator
                    .iter_errors(instance)
                    .map(|e| e.to_string())
                    .collect();
                if errors.is_empty() {
                    ValidationOutcome::Valid
                } else {
                    ValidationOutcome::Invalid(errors)
                }
            }
            Err(e) => {
                tracing::warn!(
                    schema = %stem,
                    error = %e,
                    "falling back to required-keys check: schema failed to compile"
                );
                self.required_keys_fallback(schema, instance)
            }
        }
    }

    fn compile(&self, schema: &Value) -> Result<jsonschema::Validator, jsonschema::ValidationError<'static>> {
        let mut options = jsonschema::options();
        for (id, doc) in &self.documents_by_id {
            options = options.with_document(id.clone(), doc.clone());
        }
        options.build(schema)
    }

    fn required_keys_fallback(&self, schema: &Value, instance: &Value) -> ValidationOutcome {
        let Some(instance_obj) = instance.as_object() else {
            return ValidationOutcome::Invalid(vec!["instance is not a JSON object".to_string()]);
        };
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !instance_obj.contains_key(**key))
            .map(|key| format!("missing required key {key:?}"))
            .collect();
        if missing.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_base_dir_yields_empty_registry_not_error() {
        let registry = SchemaRegistry::load("/does/not/exist").unwrap();
        assert_eq!(
            registry.validate("message_envelope", &serde_json::json!({})),
            ValidationOutcome::Unknown
        );
    }

    #[test]
    fn validates_against_loaded_schema() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("message_envelope.schema.json"),
            serde_json::to_vec(&serde_json::json!({
                "$id": "https://taskmesh.example/message_envelope.schema.json",
                "type": "object",
                "required": ["message_id"],
                "properties": {"message_id": {"type": "string"}}
            }))
            .unwrap(),
        )
        .unwrap();
        let registry = SchemaRegistry::load(dir.path()).unwrap();
        assert!(registry
            .validate("message_envelope", &serde_json::json!({"message_id": "m1"}))
            .is_valid());
        assert!(!registry
            .validate("message_envelope", &serde_json::json!({}))
            .is_valid());
    }

    #[test]
    fn fallback_checks_required_keys_when_schema_uncompilable() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("broken.schema.json"),
            serde_json::to_vec(&serde_json::json!({
                "type": "object",
                "required": ["a", "b"],
                "$schema": "not-a-real-draft-uri"
            }))
            .unwrap(),
        )
        .unwrap();
        let registry = SchemaRegistry::load(dir.path()).unwrap();
        let outcome = registry.validate("broken", &serde_json::json!({"a": 1}));
        assert!(!outcome.is_valid());
    }
}
