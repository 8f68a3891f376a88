//! Statically declared JSON Schema shapes for pairing messages and stored
//! documents.
//!
//! Every shape the handler checks is listed in [`Shape`]; the draft-7 schema
//! payloads are built in code and compiled once into a [`SchemaSet`]. Callers
//! pick a shape by discriminator and get back a [`Validation`] verdict with
//! the structured violations in the order the validator reported them.

use anyhow::{Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::{Value, json};

/// Closed set of shapes known to the pairing protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shape {
    /// Inbound message: fully typed header plus an object body.
    Envelope,
    /// Application catalog entry (`name`, `version{major,minor}`).
    CatalogEntry,
    /// Body of a `register` message.
    RegisterBody,
    /// Body of a `verify` message.
    VerifyBody,
    /// Stored app registration that is still waiting for verification.
    PendingRegistration,
}

impl Shape {
    pub const ALL: [Shape; 5] = [
        Shape::Envelope,
        Shape::CatalogEntry,
        Shape::RegisterBody,
        Shape::VerifyBody,
        Shape::PendingRegistration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Envelope => "envelope",
            Shape::CatalogEntry => "catalog-entry",
            Shape::RegisterBody => "register-body",
            Shape::VerifyBody => "verify-body",
            Shape::PendingRegistration => "pending-registration",
        }
    }

    pub fn from_name(name: &str) -> Option<Shape> {
        Shape::ALL.into_iter().find(|shape| shape.name() == name)
    }

    /// The draft-7 schema payload for this shape.
    pub fn definition(&self) -> Value {
        match self {
            Shape::Envelope => json!({
                "type": "object",
                "required": ["header", "body"],
                "properties": {
                    "header": {
                        "type": "object",
                        "required": ["requestId", "deviceId", "type", "timestamp", "ttl", "encryption"],
                        "properties": {
                            "requestId": { "type": "string" },
                            "deviceId": { "type": "string" },
                            // Left open so unknown types reach dispatch and get a
                            // persisted error response.
                            "type": { "type": "string" },
                            "timestamp": { "type": "integer", "minimum": 0 },
                            "ttl": { "type": "integer", "minimum": 0 },
                            "encryption": {
                                "type": "object",
                                "required": ["method", "tokencardId"],
                                "properties": {
                                    "method": { "type": "string" },
                                    "tokencardId": { "type": "string" }
                                }
                            }
                        }
                    },
                    "body": { "type": "object" }
                }
            }),
            Shape::CatalogEntry => json!({
                "type": "object",
                "required": ["name", "version"],
                "properties": {
                    "name": { "type": "string" },
                    "version": version_definition()
                }
            }),
            Shape::RegisterBody => json!({
                "type": "object",
                "required": ["name", "product"],
                "properties": {
                    "name": { "type": "string" },
                    "product": { "type": "string" }
                }
            }),
            Shape::VerifyBody => json!({
                "type": "object",
                "required": ["requestId", "verificationCode"],
                "properties": {
                    "requestId": { "type": "string" },
                    "verificationCode": {
                        "type": "array",
                        "items": { "type": "integer", "minimum": 0 },
                        "minItems": 2,
                        "maxItems": 2
                    }
                }
            }),
            Shape::PendingRegistration => json!({
                "type": "object",
                "required": ["name", "version", "status", "session", "lastRequest"],
                "properties": {
                    "name": { "type": "string" },
                    "version": version_definition(),
                    "status": { "type": "string", "enum": ["pending"] },
                    "session": {
                        "type": "object",
                        "required": ["id", "timeoutAt"],
                        "properties": {
                            "id": { "type": "string" },
                            "timeoutAt": { "type": "integer", "minimum": 0 }
                        }
                    },
                    "lastRequest": { "type": "integer", "minimum": 0 }
                }
            }),
        }
    }
}

fn version_definition() -> Value {
    json!({
        "type": "object",
        "required": ["major", "minor"],
        "properties": {
            "major": { "type": "integer" },
            "minor": { "type": "integer" }
        }
    })
}

/// One structured validator error, in the form sent back to devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaViolation {
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

/// Verdict of a single validation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    errors: Vec<SchemaViolation>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[SchemaViolation] {
        &self.errors
    }

    pub fn into_result(self) -> std::result::Result<(), Vec<SchemaViolation>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Every [`Shape`] compiled into a validator.
pub struct SchemaSet {
    envelope: JSONSchema,
    catalog_entry: JSONSchema,
    register_body: JSONSchema,
    verify_body: JSONSchema,
    pending_registration: JSONSchema,
}

impl SchemaSet {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            envelope: compile_shape(Shape::Envelope)?,
            catalog_entry: compile_shape(Shape::CatalogEntry)?,
            register_body: compile_shape(Shape::RegisterBody)?,
            verify_body: compile_shape(Shape::VerifyBody)?,
            pending_registration: compile_shape(Shape::PendingRegistration)?,
        })
    }

    /// Validate `instance` against `shape`. Pure; never touches a store.
    pub fn validate(&self, shape: Shape, instance: &Value) -> Validation {
        let compiled = match shape {
            Shape::Envelope => &self.envelope,
            Shape::CatalogEntry => &self.catalog_entry,
            Shape::RegisterBody => &self.register_body,
            Shape::VerifyBody => &self.verify_body,
            Shape::PendingRegistration => &self.pending_registration,
        };
        match compiled.validate(instance) {
            Ok(()) => Validation::default(),
            Err(errors) => Validation {
                errors: errors
                    .map(|err| SchemaViolation {
                        instance_path: err.instance_path.to_string(),
                        schema_path: err.schema_path.to_string(),
                        message: err.to_string(),
                    })
                    .collect(),
            },
        }
    }
}

fn compile_shape(shape: Shape) -> Result<JSONSchema> {
    let definition = shape.definition();
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&definition)
        .map_err(|err| anyhow!("compiling {} shape: {err}", shape.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemas() -> SchemaSet {
        SchemaSet::compile().expect("built-in shapes compile")
    }

    fn envelope() -> Value {
        json!({
            "header": {
                "requestId": "r1",
                "deviceId": "dev-1",
                "type": "register",
                "timestamp": 1_000,
                "ttl": 0,
                "encryption": { "method": "none", "tokencardId": "tc-1" }
            },
            "body": {}
        })
    }

    #[test]
    fn accepts_well_formed_envelope() {
        assert!(schemas().validate(Shape::Envelope, &envelope()).is_valid());
    }

    #[test]
    fn envelope_accepts_unlisted_type() {
        let mut value = envelope();
        value["header"]["type"] = json!("ping");
        assert!(schemas().validate(Shape::Envelope, &value).is_valid());
    }

    #[test]
    fn envelope_requires_encryption_token() {
        let mut value = envelope();
        value["header"]["encryption"] = json!({ "method": "none" });
        let verdict = schemas().validate(Shape::Envelope, &value);
        assert!(!verdict.is_valid());
        assert!(
            verdict
                .errors()
                .iter()
                .any(|err| err.instance_path == "/header/encryption")
        );
    }

    #[test]
    fn envelope_rejects_negative_ttl_and_string_body() {
        let mut value = envelope();
        value["header"]["ttl"] = json!(-1);
        value["body"] = json!("text");
        let verdict = schemas().validate(Shape::Envelope, &value);
        assert_eq!(verdict.errors().len(), 2);
    }

    #[test]
    fn verify_body_needs_exactly_two_codes() {
        let schemas = schemas();
        for codes in [json!([1]), json!([1, 2, 3]), json!([-1, 0]), json!(["1", "2"])] {
            let body = json!({ "requestId": "r1", "verificationCode": codes });
            assert!(
                !schemas.validate(Shape::VerifyBody, &body).is_valid(),
                "expected {codes} to be rejected"
            );
        }
        let body = json!({ "requestId": "r1", "verificationCode": [7, 8] });
        assert!(schemas.validate(Shape::VerifyBody, &body).is_valid());
    }

    #[test]
    fn pending_registration_rejects_registered_status() {
        let registration = json!({
            "name": "Thermostat",
            "version": { "major": 1, "minor": 0 },
            "status": "registered",
            "session": { "id": "", "timeoutAt": 0 },
            "lastRequest": 5
        });
        let verdict = schemas().validate(Shape::PendingRegistration, &registration);
        assert!(!verdict.is_valid());
        assert_eq!(verdict.errors()[0].instance_path, "/status");
    }

    #[test]
    fn shape_names_round_trip() {
        for shape in Shape::ALL {
            assert_eq!(Shape::from_name(shape.name()), Some(shape));
        }
        assert_eq!(Shape::from_name("boundary"), None);
    }
}
