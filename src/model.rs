//! Wire and document types for the pairing protocol.
//!
//! Field names follow the camelCase JSON used by devices and by the stored
//! documents, so these types serialize straight into store documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Integer fields that also accept floats with no fractional part, the way
/// the draft-7 `integer` type does (`42.0` is `42`).
mod integral {
    use serde::Deserialize;
    use serde::de::{Deserializer, Error};
    use serde_json::Number;

    fn to_u64<E: Error>(number: &Number) -> Result<u64, E> {
        if let Some(value) = number.as_u64() {
            return Ok(value);
        }
        match number.as_f64() {
            Some(value) if value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64 => {
                Ok(value as u64)
            }
            _ => Err(E::custom(format!("expected a non-negative integer, got {number}"))),
        }
    }

    fn to_i64<E: Error>(number: &Number) -> Result<i64, E> {
        if let Some(value) = number.as_i64() {
            return Ok(value);
        }
        match number.as_f64() {
            Some(value)
                if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
            {
                Ok(value as i64)
            }
            _ => Err(E::custom(format!("expected an integer, got {number}"))),
        }
    }

    pub fn as_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        to_u64(&Number::deserialize(deserializer)?)
    }

    pub fn as_u64_pair<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u64; 2], D::Error> {
        let [first, second] = <[Number; 2]>::deserialize(deserializer)?;
        Ok([to_u64(&first)?, to_u64(&second)?])
    }

    pub fn as_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        to_i64(&Number::deserialize(deserializer)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub method: String,
    #[serde(rename = "tokencardId")]
    pub tokencard_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub request_id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    /// Milliseconds since the Unix epoch.
    #[serde(deserialize_with = "integral::as_u64")]
    pub timestamp: u64,
    /// Seconds; zero disables expiry.
    #[serde(deserialize_with = "integral::as_u64")]
    pub ttl: u64,
    pub encryption: Encryption,
}

impl Header {
    pub fn kind(&self) -> MessageType {
        MessageType::parse(&self.message_type)
    }

    pub fn tokencard_id(&self) -> &str {
        &self.encryption.tokencard_id
    }

    /// True when `ttl > 0` and `now_ms` is past `timestamp + ttl` seconds.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        if self.ttl == 0 {
            return false;
        }
        let deadline = self
            .timestamp
            .saturating_add(self.ttl.saturating_mul(1000));
        now_ms > deadline
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Register,
    Unregister,
    Verify,
    Other(String),
}

impl MessageType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "register" => MessageType::Register,
            "unregister" => MessageType::Unregister,
            "verify" => MessageType::Verify,
            other => MessageType::Other(other.to_string()),
        }
    }
}

/// Inbound message. The body shape depends on the header type and is
/// checked by the sub-flow that consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    pub body: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(deserialize_with = "integral::as_i64")]
    pub major: i64,
    #[serde(deserialize_with = "integral::as_i64")]
    pub minor: i64,
}

/// Application catalog entry, projected to the fields pairing needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: Version,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub product: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub request_id: String,
    #[serde(deserialize_with = "integral::as_u64_pair")]
    pub verification_code: [u64; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Pending,
    Registered,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub timeout_at: u64,
}

impl Session {
    /// Session key tying a register call to its verify call.
    pub fn key(request_id: &str, verification_code: u64) -> String {
        format!("{request_id}:{verification_code}")
    }

    pub fn cleared() -> Self {
        Self {
            id: String::new(),
            timeout_at: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistration {
    pub name: String,
    pub version: Version,
    pub status: AppStatus,
    pub session: Session,
    pub nonce: u32,
    pub last_request: u64,
}

/// Device document as stored in the `devices` collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub apps: BTreeMap<String, AppRegistration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub timestamp: u64,
    pub status: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resends {
    pub num_resends: u32,
    pub max_resends: u32,
    pub resend_after: u64,
    pub resend_timeout: u64,
}

/// Outbound response record in the `actions` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub device_id: String,
    pub encryption: Encryption,
    pub request_id: String,
    pub action: String,
    pub params: Value,
    pub status: i64,
    pub created_at: u64,
    pub timeout_at: u64,
    pub progress: Vec<Progress>,
    pub resends: Resends,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(timestamp: u64, ttl: u64) -> Header {
        Header {
            request_id: "r1".into(),
            device_id: "dev-1".into(),
            message_type: "register".into(),
            timestamp,
            ttl,
            encryption: Encryption {
                method: "none".into(),
                tokencard_id: "tc-1".into(),
            },
        }
    }

    #[test]
    fn integral_floats_decode_as_integers() {
        let body: VerifyBody = serde_json::from_value(serde_json::json!({
            "requestId": "r1",
            "verificationCode": [42.0, 43]
        }))
        .unwrap();
        assert_eq!(body.verification_code, [42, 43]);

        let version: Version =
            serde_json::from_value(serde_json::json!({ "major": 2.0, "minor": -1.0 })).unwrap();
        assert_eq!(version, Version { major: 2, minor: -1 });
    }

    #[test]
    fn fractional_or_negative_codes_are_rejected() {
        for codes in [serde_json::json!([42.5, 43]), serde_json::json!([-1.0, 0])] {
            let decoded = serde_json::from_value::<VerifyBody>(serde_json::json!({
                "requestId": "r1",
                "verificationCode": codes
            }));
            assert!(decoded.is_err());
        }
    }

    #[test]
    fn zero_ttl_never_expires() {
        assert!(!header(0, 0).is_expired(u64::MAX));
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let h = header(10_000, 5);
        assert!(!h.is_expired(15_000));
        assert!(h.is_expired(15_001));
    }

    #[test]
    fn header_uses_wire_field_names() {
        let value = serde_json::to_value(header(1, 2)).unwrap();
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["type"], "register");
        assert_eq!(value["encryption"]["tokencardId"], "tc-1");
    }

    #[test]
    fn unknown_types_are_kept_verbatim() {
        assert_eq!(MessageType::parse("ping"), MessageType::Other("ping".into()));
        assert_eq!(MessageType::parse("verify"), MessageType::Verify);
    }
}
