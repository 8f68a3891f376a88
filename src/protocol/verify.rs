use super::{PairingHandler, decode, ok_reply};
use crate::error::{PairingError, Result};
use crate::model::{Envelope, Session, VerifyBody};
use crate::schema::Shape;
use serde_json::Value;
use tracing::info;

pub const STATUS_VERIFIED: &str = "received verification code";

impl PairingHandler {
    /// Complete a pending registration.
    ///
    /// The body must echo the register request id and the issued code
    /// followed by its successor. Only a registration that is still pending
    /// under exactly that session moves to `registered`.
    ///
    /// The transition is committed before the progress entry is appended to
    /// the register response. If that append fails the reply is a store
    /// error but the application stays `registered`.
    pub(super) async fn verify(&self, envelope: &Envelope) -> Result<Value> {
        self.schemas
            .validate(Shape::VerifyBody, &envelope.body)
            .into_result()?;
        let body: VerifyBody = decode(&envelope.body, "/body")?;
        let [code, successor] = body.verification_code;
        if code.checked_add(1) != Some(successor) {
            return Err(PairingError::InvalidVerificationCode);
        }

        let header = &envelope.header;
        let tokencard_id = header.tokencard_id();
        let apps = self
            .directory
            .find_apps(&header.device_id)
            .await?
            .ok_or(PairingError::DeviceNotFound)?;
        let stored = apps
            .get(tokencard_id)
            .ok_or(PairingError::ApplicationNotRegistered)?;
        self.schemas
            .validate(Shape::PendingRegistration, stored)
            .into_result()?;

        let expected = Session::key(&body.request_id, code);
        let session_id = stored
            .pointer("/session/id")
            .and_then(Value::as_str)
            .ok_or_else(|| PairingError::invalid("/session/id", "missing session id"))?;
        if session_id != expected {
            return Err(PairingError::SessionMismatch);
        }

        // Conditional on the same pending session; no match means another
        // verify already completed it.
        if !self
            .directory
            .mark_registered(&header.device_id, tokencard_id, &expected)
            .await?
        {
            return Err(PairingError::SessionMismatch);
        }
        self.actions
            .append_progress(
                &header.device_id,
                tokencard_id,
                &body.request_id,
                STATUS_VERIFIED,
                self.clock.now_ms(),
            )
            .await?;

        info!(
            device_id = %header.device_id,
            tokencard_id,
            "application registered"
        );
        Ok(ok_reply())
    }
}
