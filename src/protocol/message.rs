//! Request and response messages.
//!
//! A [`RawMessage`] is the undecoded bytes of one complete MessagePack value
//! as cut out of the input stream by [`MessageBuffer`](super::MessageBuffer).
//! Decoding it into a [`Request`] is a separate step so that framing errors
//! and content errors stay distinguishable.

use std::fmt;

use bytes::Bytes;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::lang::Value;

/// One complete, still encoded, MessagePack value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Bytes,
}

impl RawMessage {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Decode the message body.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::MsgPackDecode`](crate::ReplError::MsgPackDecode)
    /// if the value does not have the shape of `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.bytes)
    }
}

/// `{"statement": <text>}`. Unknown keys are ignored.
///
/// Only the map form is accepted; a positional array such as `["1+1"]` is
/// rejected even though it would fill the same field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub statement: String,
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(RequestVisitor)
    }
}

struct RequestVisitor;

impl<'de> Visitor<'de> for RequestVisitor {
    type Value = Request;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with a \"statement\" key")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Request, A::Error> {
        let mut statement = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "statement" {
                statement = Some(map.next_value::<String>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        let statement = statement.ok_or_else(|| <A::Error as de::Error>::missing_field("statement"))?;
        Ok(Request { statement })
    }
}

impl Request {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

/// Reply to one request.
///
/// `result` and `error` are always present (as nil when unset). `etype` is
/// only emitted by the typed protocol variant.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub result: Option<Value>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etype: Option<Option<String>>,
}

impl Response {
    /// Successful evaluation or execution.
    pub fn success(result: Option<Value>) -> Self {
        Self {
            result,
            error: None,
            etype: None,
        }
    }

    /// Failed attempt carrying only the error text.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
            etype: None,
        }
    }

    /// Include the `etype` key, nil unless `etype` is given.
    pub fn with_error_type(mut self, etype: Option<String>) -> Self {
        self.etype = Some(etype);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_request_decode() {
        let bytes = MsgPackCodec::encode(&Request::new("1 + 1")).unwrap();
        let message = RawMessage::new(Bytes::from(bytes));
        let request: Request = message.decode().unwrap();
        assert_eq!(request.statement, "1 + 1");
    }

    #[test]
    fn test_request_ignores_extra_keys() {
        let mut map = BTreeMap::new();
        map.insert("statement", "x");
        map.insert("id", "7");
        let message = RawMessage::new(MsgPackCodec::encode(&map).unwrap().into());
        let request: Request = message.decode().unwrap();
        assert_eq!(request.statement, "x");
    }

    #[test]
    fn test_request_requires_text_statement() {
        let mut map = BTreeMap::new();
        map.insert("statement", 5);
        let message = RawMessage::new(MsgPackCodec::encode(&map).unwrap().into());
        assert!(message.decode::<Request>().is_err());

        let message = RawMessage::new(MsgPackCodec::encode(&[1, 2]).unwrap().into());
        assert!(message.decode::<Request>().is_err());

        let message = RawMessage::new(MsgPackCodec::encode(&BTreeMap::<&str, &str>::new()).unwrap().into());
        let err = message.decode::<Request>().unwrap_err();
        assert!(err.to_string().contains("statement"));
    }

    #[test]
    fn test_request_rejects_positional_form() {
        let message = RawMessage::new(MsgPackCodec::encode(&["1+1"]).unwrap().into());
        assert!(message.decode::<Request>().is_err());
    }

    #[test]
    fn test_response_keys() {
        let plain = Response::success(Some(Value::Int(2)));
        let decoded: serde_json::Value =
            rmp_serde::from_slice(&MsgPackCodec::encode(&plain).unwrap()).unwrap();
        assert_eq!(decoded, serde_json::json!({"result": 2, "error": null}));

        let typed = Response::failure("division by zero")
            .with_error_type(Some("ZeroDivisionError".to_string()));
        let decoded: serde_json::Value =
            rmp_serde::from_slice(&MsgPackCodec::encode(&typed).unwrap()).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({
                "result": null,
                "error": "division by zero",
                "etype": "ZeroDivisionError",
            })
        );

        let typed_ok = Response::success(None).with_error_type(None);
        let decoded: serde_json::Value =
            rmp_serde::from_slice(&MsgPackCodec::encode(&typed_ok).unwrap()).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({"result": null, "error": null, "etype": null})
        );
    }
}
