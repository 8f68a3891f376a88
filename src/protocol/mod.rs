//! Pairing protocol handler.
//!
//! [`PairingHandler::handle`] takes one raw message and produces the reply to
//! deliver back through intake. Every step short-circuits on failure:
//!
//! 1. the envelope must match [`Shape::Envelope`];
//! 2. the token card id must resolve to a well-formed catalog entry;
//! 3. an expired message gets a persisted `MessageExpired` response;
//! 4. the header type selects register, unregister, or verify.
//!
//! Register replies and unknown-type errors are always persisted as actions.
//! Unregister and verify replies are persisted only when they are errors.
//! Failures in steps 1 and 2 are returned bare.

mod challenge;
mod register;
mod unregister;
mod verify;

pub use challenge::{ChallengeSource, Clock, RandomChallenges, SystemClock, VERIFICATION_CODE_LIMIT};

use crate::action_log::ActionLog;
use crate::catalog::ApplicationCatalog;
use crate::config::Config;
use crate::directory::DeviceDirectory;
use crate::error::{PairingError, Result};
use crate::model::{CatalogEntry, Envelope, Header, MessageType};
use crate::schema::{SchemaSet, Shape};
use crate::store::DocumentStore;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PairingHandler {
    schemas: Arc<SchemaSet>,
    catalog: ApplicationCatalog,
    directory: DeviceDirectory,
    actions: ActionLog,
    clock: Arc<dyn Clock>,
    challenges: Arc<dyn ChallengeSource>,
}

impl PairingHandler {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            schemas: Arc::new(SchemaSet::compile()?),
            catalog: ApplicationCatalog::new(store.clone()),
            directory: DeviceDirectory::new(store.clone()),
            actions: ActionLog::new(store, config.actions),
            clock: Arc::new(SystemClock),
            challenges: Arc::new(RandomChallenges),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_challenges(mut self, challenges: Arc<dyn ChallengeSource>) -> Self {
        self.challenges = challenges;
        self
    }

    /// Process one message and return the reply payload.
    pub async fn handle(&self, message: &Value) -> Value {
        let (envelope, app) = match self.admit(message).await {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(code = err.code(), error = %err, "rejected message");
                return err.to_reply();
            }
        };
        let header = &envelope.header;

        if header.is_expired(self.clock.now_ms()) {
            debug!(request_id = %header.request_id, "message expired");
            return self.respond(header, PairingError::MessageExpired.to_reply()).await;
        }

        match header.kind() {
            MessageType::Register => {
                let reply = match self.register(&envelope, &app).await {
                    Ok(reply) => reply,
                    Err(err) => self.failed(header, err),
                };
                self.respond(header, reply).await
            }
            MessageType::Unregister => match self.unregister(&envelope).await {
                Ok(reply) => reply,
                Err(err) => {
                    let reply = self.failed(header, err);
                    self.respond(header, reply).await
                }
            },
            MessageType::Verify => match self.verify(&envelope).await {
                Ok(reply) => reply,
                Err(err) => {
                    let reply = self.failed(header, err);
                    self.respond(header, reply).await
                }
            },
            MessageType::Other(kind) => {
                let reply = self.failed(header, PairingError::UnknownMessageType(kind));
                self.respond(header, reply).await
            }
        }
    }

    /// Envelope shape plus catalog resolution.
    async fn admit(&self, message: &Value) -> Result<(Envelope, CatalogEntry)> {
        self.schemas
            .validate(Shape::Envelope, message)
            .into_result()?;
        let envelope: Envelope = decode(message, "")?;

        let entry = self
            .catalog
            .find(envelope.header.tokencard_id())
            .await?
            .ok_or(PairingError::ApplicationNotFound)?;
        self.schemas
            .validate(Shape::CatalogEntry, &entry)
            .into_result()?;
        let app: CatalogEntry = decode(&entry, "")?;
        Ok((envelope, app))
    }

    fn failed(&self, header: &Header, err: PairingError) -> Value {
        warn!(
            request_id = %header.request_id,
            device_id = %header.device_id,
            tokencard_id = %header.tokencard_id(),
            code = err.code(),
            error = %err,
            "pairing request failed"
        );
        err.to_reply()
    }

    async fn respond(&self, header: &Header, payload: Value) -> Value {
        self.actions
            .create_device_response(header, payload, self.clock.now_ms())
            .await
    }
}

fn ok_reply() -> Value {
    json!({ "status": "OK" })
}

/// Deserialize a shape-checked value; any mismatch left is a validation error.
fn decode<T: DeserializeOwned>(value: &Value, instance_path: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|err| PairingError::invalid(instance_path, err.to_string()))
}
