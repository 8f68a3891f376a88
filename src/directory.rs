//! Device directory: per-device documents holding registered applications.
//!
//! Every write addresses `apps.<tokencardId>` (or a field below it) by path,
//! so registrations of different applications on the same device never
//! overwrite one another.

use crate::error::{PairingError, Result, StoreError, StoreOp};
use crate::model::{AppRegistration, RegisterBody, Session};
use crate::store::{Collection, DEVICES, Document, DocumentStore, FieldPath, Filter, Update};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct DeviceDirectory {
    store: Arc<dyn DocumentStore>,
}

fn app_path(tokencard_id: &str) -> FieldPath {
    FieldPath::new(["apps", tokencard_id])
}

impl DeviceDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn devices(&self) -> Result<Arc<dyn Collection>> {
        self.store
            .collection(DEVICES)
            .await
            .map_err(PairingError::persistence(StoreOp::CollectionAccess))
    }

    /// Record a pending registration, creating the device document if needed.
    pub async fn register_app(
        &self,
        device_id: &str,
        body: &RegisterBody,
        tokencard_id: &str,
        registration: &AppRegistration,
    ) -> Result<()> {
        let registration = serde_json::to_value(registration).map_err(|err| {
            PairingError::persistence(StoreOp::Update)(StoreError::Backend(err.to_string()))
        })?;
        let update = Update::new()
            .set(FieldPath::parse("deviceName"), body.name.as_str())
            .set(FieldPath::parse("productName"), body.product.as_str())
            .set(app_path(tokencard_id), registration);
        let outcome = self
            .devices()
            .await?
            .update_one(&Filter::by_id(device_id), &update, true)
            .await
            .map_err(PairingError::persistence(StoreOp::Update))?;
        debug!(device_id, tokencard_id, created = outcome.upserted, "stored pending registration");
        Ok(())
    }

    /// Drop an application from a device. Absent devices or apps are not an error.
    pub async fn remove_app(&self, device_id: &str, tokencard_id: &str) -> Result<()> {
        self.devices()
            .await?
            .update_one(
                &Filter::by_id(device_id),
                &Update::new().unset(app_path(tokencard_id)),
                false,
            )
            .await
            .map_err(PairingError::persistence(StoreOp::Update))?;
        Ok(())
    }

    /// The device's `apps` mapping, or `None` when the device is unknown or
    /// has no mapping.
    pub async fn find_apps(&self, device_id: &str) -> Result<Option<Document>> {
        let device = self
            .devices()
            .await?
            .find_one(&Filter::by_id(device_id), Some(&[FieldPath::parse("apps")]))
            .await
            .map_err(PairingError::persistence(StoreOp::Lookup))?;
        Ok(device.and_then(|mut device| match device.remove("apps") {
            Some(Value::Object(apps)) => Some(apps),
            _ => None,
        }))
    }

    /// Move a pending registration to `registered` and clear its session.
    ///
    /// The update only applies while the stored registration is still pending
    /// under `session_id`; returns `false` when it no longer is.
    pub async fn mark_registered(
        &self,
        device_id: &str,
        tokencard_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        let app = app_path(tokencard_id);
        let filter = Filter::by_id(device_id)
            .eq(app.child("status"), "pending")
            .eq(app.child("session").child("id"), session_id);
        let session = serde_json::to_value(Session::cleared()).map_err(|err| {
            PairingError::persistence(StoreOp::Update)(StoreError::Backend(err.to_string()))
        })?;
        let update = Update::new()
            .set(app.child("status"), "registered")
            .set(app.child("session"), session);
        let outcome = self
            .devices()
            .await?
            .update_one(&filter, &update, false)
            .await
            .map_err(PairingError::persistence(StoreOp::Update))?;
        Ok(outcome.matched)
    }
}
