//! Password account attributes as carried across the API boundary.
//!
//! The core never interprets these: they are decoded, kept next to the raw
//! response they came from, and handed back to callers unchanged.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Raw response a value was decoded from, kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    pub body: Vec<u8>,
    pub map: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordAccountAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_password"
    )]
    pub password: Option<SecretString>,
    #[serde(skip)]
    last_response: Option<ResponseEnvelope>,
}

fn serialize_password<S: Serializer>(
    password: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match password {
        Some(password) => serializer.serialize_some(password.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl PasswordAccountAttributes {
    pub fn new(login_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_name: Some(login_name.into()),
            password: Some(SecretString::new(password.into())),
            last_response: None,
        }
    }

    /// Decode attributes from a JSON response body, retaining the body and
    /// its top-level key/value map.
    pub fn from_response(body: Vec<u8>) -> Result<Self, serde_json::Error> {
        let map: Map<String, Value> = serde_json::from_slice(&body)?;
        let mut attrs: Self = serde_json::from_value(Value::Object(map.clone()))?;
        attrs.last_response = Some(ResponseEnvelope { body, map });
        Ok(attrs)
    }

    pub fn set_last_response(&mut self, envelope: ResponseEnvelope) {
        self.last_response = Some(envelope);
    }

    pub fn last_response_body(&self) -> Option<&[u8]> {
        self.last_response.as_ref().map(|r| r.body.as_slice())
    }

    pub fn last_response_map(&self) -> Option<&Map<String, Value>> {
        self.last_response.as_ref().map(|r| &r.map)
    }
}
