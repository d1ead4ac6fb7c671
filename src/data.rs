//! Values crossing the client boundary: call arguments in, decoded data out.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::CallError;
use crate::handlers::Interceptor;

/// One runtime argument of a remote call.
///
/// `Callback` carries a caller-supplied handler; it only takes part in
/// dispatch when passed at a parameter declared as a callback.
#[derive(Clone, Default)]
pub enum Arg {
    #[default]
    Null,
    Value(Value),
    Bytes(Bytes),
    Callback(Arc<dyn Interceptor>),
}

impl Arg {
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, CallError> {
        serde_json::to_value(value)
            .map(Arg::Value)
            .map_err(|e| CallError::Encode(e.to_string()))
    }

    pub fn callback<H: Interceptor + 'static>(handler: H) -> Self {
        Arg::Callback(Arc::new(handler))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null | Arg::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Arc<dyn Interceptor>> {
        match self {
            Arg::Callback(handler) => Some(handler),
            _ => None,
        }
    }

    /// Textual form used for path segments, query pairs and header values
    pub fn render(&self) -> Option<String> {
        match self {
            Arg::Null | Arg::Callback(_) => None,
            Arg::Value(Value::Null) => None,
            Arg::Value(Value::String(s)) => Some(s.clone()),
            Arg::Value(other) => Some(other.to_string()),
            Arg::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("Null"),
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Arg::Callback(handler) => write!(f, "Callback({})", handler.name()),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Value(Value::String(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Value(Value::Bool(value))
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Null)
    }
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Data {
    /// Deserialize into the caller's type
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, CallError> {
        let decoded = match self {
            Data::Json(value) => serde_json::from_value(value),
            Data::Text(text) => serde_json::from_value(Value::String(text)),
            Data::Bytes(bytes) => serde_json::from_slice(&bytes),
        };
        decoded.map_err(|e| CallError::Decode(e.to_string()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Data::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Data::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Data::Json(value)
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::Text(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_render_args() {
        assert_eq!(Arg::from("alice").render().as_deref(), Some("alice"));
        assert_eq!(Arg::from(42i64).render().as_deref(), Some("42"));
        assert_eq!(Arg::from(true).render().as_deref(), Some("true"));
        assert_eq!(Arg::Null.render(), None);
        assert_eq!(Arg::from(None::<String>).render(), None);
        assert!(Arg::Value(Value::Null).is_null());
    }

    #[test]
    fn test_serialize_arg() {
        let arg = Arg::serialize(&json!({"id": 1})).unwrap();
        assert_eq!(arg.as_value(), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_decode_json() {
        let data = Data::Json(json!({"id": 7, "name": "ada"}));
        let user: User = data.decode().unwrap();
        assert_eq!(user, User { id: 7, name: "ada".into() });
    }

    #[test]
    fn test_decode_text_and_bytes() {
        let text: String = Data::Text("pong".into()).decode().unwrap();
        assert_eq!(text, "pong");

        let user: User = Data::Bytes(Bytes::from_static(br#"{"id":1,"name":"b"}"#))
            .decode()
            .unwrap();
        assert_eq!(user.id, 1);
    }

    #[test]
    fn test_decode_mismatch_is_decode_error() {
        let result = Data::Text("nope".into()).decode::<User>();
        assert!(matches!(result, Err(CallError::Decode(_))));
    }
}
