use super::{PairingHandler, ok_reply};
use crate::error::Result;
use crate::model::Envelope;
use serde_json::Value;
use tracing::info;

impl PairingHandler {
    /// Remove the application from the device. Safe to repeat.
    pub(super) async fn unregister(&self, envelope: &Envelope) -> Result<Value> {
        let header = &envelope.header;
        self.directory
            .remove_app(&header.device_id, header.tokencard_id())
            .await?;
        info!(
            device_id = %header.device_id,
            tokencard_id = %header.tokencard_id(),
            "application unregistered"
        );
        Ok(ok_reply())
    }
}
