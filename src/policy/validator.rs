use crate::data::DataView;
use crate::error::{MofkaError, Result};
use crate::metadata::Metadata;

/// Rejects malformed events before they are batched.
///
/// Called once per event on the producer path, before batching
/// (spec.md §4.3). A Validator is a pure function of the event's
/// metadata and data: it must not mutate shared state it doesn't own.
pub trait Validator: Send + Sync {
    /// Validate one event; fail with `InvalidMetadata` on rejection.
    fn validate(&self, metadata: &Metadata, data: &DataView) -> Result<()>;

    /// A snapshot sufficient to reconstruct this instance, published
    /// alongside topic creation so every server instantiates the same
    /// policy.
    fn metadata(&self) -> Metadata;
}

/// Accepts every event. The default Validator for topics that don't
/// need one.
#[derive(Debug, Default)]
pub struct AcceptAllValidator;

impl Validator for AcceptAllValidator {
    fn validate(&self, _metadata: &Metadata, _data: &DataView) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> Metadata {
        Metadata::new(serde_json::json!({ "type": "default" }))
    }
}

/// Rejects an event unless every field named in `required_fields` is
/// present in its metadata.
///
/// Grounded on `docs/_code/energy_validator.cpp` from the original
/// implementation, which rejects events whose `"energy"` field is
/// missing or out of range — generalized here to an arbitrary
/// required-field check so the crate ships one concrete, non-trivial
/// example validator alongside the no-op default.
#[derive(Debug)]
pub struct RequiredFieldsValidator {
    required_fields: Vec<String>,
}

impl RequiredFieldsValidator {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }
}

impl Validator for RequiredFieldsValidator {
    fn validate(&self, metadata: &Metadata, _data: &DataView) -> Result<()> {
        for field in &self.required_fields {
            if metadata.get(field).is_none() {
                return Err(MofkaError::InvalidMetadata(format!(
                    "missing required field: {field}"
                )));
            }
        }
        Ok(())
    }

    fn metadata(&self) -> Metadata {
        Metadata::new(serde_json::json!({
            "type": "required_fields",
            "required_fields": self.required_fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accept_all_never_rejects() {
        let v = AcceptAllValidator;
        assert!(v.validate(&Metadata::new(json!({})), &DataView::empty()).is_ok());
    }

    #[test]
    fn required_fields_rejects_missing_field() {
        let v = RequiredFieldsValidator::new(vec!["energy".to_string()]);
        let err = v
            .validate(&Metadata::new(json!({"other": 1})), &DataView::empty())
            .unwrap_err();
        assert!(matches!(err, MofkaError::InvalidMetadata(_)));
    }

    #[test]
    fn required_fields_accepts_when_present() {
        let v = RequiredFieldsValidator::new(vec!["energy".to_string()]);
        assert!(v
            .validate(&Metadata::new(json!({"energy": 10})), &DataView::empty())
            .is_ok());
    }
}
