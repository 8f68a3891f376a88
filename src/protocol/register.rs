use super::{PairingHandler, decode};
use crate::error::{PairingError, Result};
use crate::model::{AppRegistration, AppStatus, CatalogEntry, Envelope, RegisterBody, Session};
use crate::schema::Shape;
use serde_json::{Value, json};
use tracing::info;

impl PairingHandler {
    /// Store a pending registration and issue a verification code.
    ///
    /// The device is expected to answer with `[code, code + 1]` in a verify
    /// message carrying this request id.
    pub(super) async fn register(&self, envelope: &Envelope, app: &CatalogEntry) -> Result<Value> {
        self.schemas
            .validate(Shape::RegisterBody, &envelope.body)
            .into_result()?;
        let body: RegisterBody = decode(&envelope.body, "/body")?;
        if body.name.is_empty() {
            return Err(PairingError::InvalidDeviceName);
        }
        if body.product.is_empty() {
            return Err(PairingError::InvalidProductName);
        }

        let header = &envelope.header;
        let verification_code = self.challenges.verification_code();
        let registration = AppRegistration {
            name: app.name.clone(),
            version: app.version,
            status: AppStatus::Pending,
            session: Session {
                id: Session::key(&header.request_id, verification_code),
                timeout_at: 0,
            },
            nonce: self.challenges.nonce(),
            last_request: self.clock.now_ms(),
        };
        self.directory
            .register_app(&header.device_id, &body, header.tokencard_id(), &registration)
            .await?;

        info!(
            device_id = %header.device_id,
            tokencard_id = %header.tokencard_id(),
            request_id = %header.request_id,
            "application registration pending verification"
        );
        Ok(json!({
            "responseType": "verify",
            "verificationCode": verification_code,
        }))
    }
}
