//! Action log: durable response records owed to devices.
//!
//! [`ActionLog::create_device_response`] is the only place an action is
//! created; [`ActionLog::append_progress`] is the only mutation of an
//! existing one.

use crate::config::ActionPolicy;
use crate::error::{PairingError, Result, StoreError, StoreOp};
use crate::model::{Action, Header, Progress, Resends};
use crate::store::{ACTIONS, Document, DocumentStore, FieldPath, Filter, Update};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const RESPONSE_ACTION: &str = "response";
pub const STATUS_CREATED: &str = "created";

pub struct ActionLog {
    store: Arc<dyn DocumentStore>,
    policy: ActionPolicy,
}

impl ActionLog {
    pub fn new(store: Arc<dyn DocumentStore>, policy: ActionPolicy) -> Self {
        Self { store, policy }
    }

    /// Build the response record for `payload` as of `now` (ms).
    pub fn build_response(&self, header: &Header, payload: Value, now: u64) -> Action {
        Action {
            device_id: header.device_id.clone(),
            encryption: header.encryption.clone(),
            request_id: header.request_id.clone(),
            action: RESPONSE_ACTION.to_string(),
            params: payload,
            status: 0,
            created_at: now,
            timeout_at: now.saturating_add(self.policy.timeout_ms),
            progress: vec![Progress {
                timestamp: now,
                status: STATUS_CREATED.to_string(),
            }],
            resends: Resends {
                num_resends: 0,
                max_resends: self.policy.max_resends,
                resend_after: now.saturating_add(self.policy.resend_timeout_ms),
                resend_timeout: self.policy.resend_timeout_ms,
            },
        }
    }

    /// Persist a response record for `payload` and return the reply to send.
    ///
    /// The reply is `payload` itself when the record is stored. If the write
    /// fails the reply becomes the persistence error and `payload` is dropped.
    pub async fn create_device_response(&self, header: &Header, payload: Value, now: u64) -> Value {
        let action = self.build_response(header, payload, now);
        match self.insert(&action).await {
            Ok(()) => {
                debug!(
                    device_id = %header.device_id,
                    request_id = %header.request_id,
                    "stored device response"
                );
                action.params
            }
            Err(err) => {
                warn!(
                    device_id = %header.device_id,
                    request_id = %header.request_id,
                    error = %err,
                    "failed to store device response"
                );
                err.to_reply()
            }
        }
    }

    async fn insert(&self, action: &Action) -> Result<()> {
        let doc = to_document(action).map_err(PairingError::persistence(StoreOp::Insert))?;
        self.store
            .collection(ACTIONS)
            .await
            .map_err(PairingError::persistence(StoreOp::CollectionAccess))?
            .insert_one(doc)
            .await
            .map_err(PairingError::persistence(StoreOp::Insert))
    }

    /// Append a progress entry to the response created for `request_id`.
    /// Does nothing when no such record exists.
    pub async fn append_progress(
        &self,
        device_id: &str,
        tokencard_id: &str,
        request_id: &str,
        status: &str,
        now: u64,
    ) -> Result<()> {
        let filter = Filter::default()
            .eq(FieldPath::parse("deviceId"), device_id)
            .eq(FieldPath::parse("encryption.tokencardId"), tokencard_id)
            .eq(FieldPath::parse("requestId"), request_id);
        let entry = serde_json::to_value(Progress {
            timestamp: now,
            status: status.to_string(),
        })
        .map_err(|err| {
            PairingError::persistence(StoreOp::Update)(StoreError::Backend(err.to_string()))
        })?;
        let outcome = self
            .store
            .collection(ACTIONS)
            .await
            .map_err(PairingError::persistence(StoreOp::CollectionAccess))?
            .update_one(&filter, &Update::new().push(FieldPath::parse("progress"), entry), false)
            .await
            .map_err(PairingError::persistence(StoreOp::Update))?;
        if !outcome.matched {
            debug!(device_id, request_id, "no response record to append progress to");
        }
        Ok(())
    }
}

fn to_document(action: &Action) -> std::result::Result<Document, StoreError> {
    match serde_json::to_value(action) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::Backend("action did not serialize to an object".into())),
        Err(err) => Err(StoreError::Backend(err.to_string())),
    }
}
