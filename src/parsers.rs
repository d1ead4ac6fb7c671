//! Response parsers and character sets.
//!
//! Parsers run in the After phase once the transport has filled in the raw
//! body. Each one only acts for its own return kind, so a method ends up with
//! at most one of them doing work.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde_json::Value;
use tracing::debug;

use crate::context::keys;
use crate::data::Data;
use crate::descriptor::ReturnKind;
use crate::error::CallError;
use crate::handlers::{Handler, Interceptor, Phase};
use crate::invoker::Invocation;
use crate::markers::{keys as marker_keys, priority};

/// Character sets accepted for text bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    UsAscii,
    Iso8859_1,
}

impl Charset {
    /// Case-insensitive lookup by IANA name or common alias
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "us-ascii" | "ascii" => Some(Charset::UsAscii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Charset::Iso8859_1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::UsAscii => "us-ascii",
            Charset::Iso8859_1 => "iso-8859-1",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, CallError> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| CallError::Decode(format!("invalid utf-8: {}", e))),
            Charset::UsAscii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(at) => Err(CallError::Decode(format!(
                    "non-ascii byte 0x{:02x} at offset {}",
                    bytes[at], at
                ))),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            Charset::Iso8859_1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Result<Bytes, CallError> {
        match self {
            Charset::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Charset::UsAscii if text.is_ascii() => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Charset::UsAscii => Err(CallError::Encode(format!(
                "text is not representable in {}",
                self.as_str()
            ))),
            Charset::Iso8859_1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)))
                .collect::<Result<Vec<u8>, _>>()
                .map(Bytes::from)
                .map_err(|_| {
                    CallError::Encode(format!("text is not representable in {}", self.as_str()))
                }),
        }
    }
}

/// Content type the parsers should trust: a return-level override first,
/// then the response header
fn effective_content_type(inv: &Invocation<'_>) -> Option<Mime> {
    inv.config()
        .get(&marker_keys::RESPONSE_CONTENT_TYPE)
        .cloned()
        .or_else(|| inv.response.content_type())
}

fn is_json(mime: &Mime) -> bool {
    mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON)
}

/// Parse failures are raised for this attempt and also kept as fatal, so the
/// caller sees them even though they are never retried
fn record_decode_failure(inv: &mut Invocation<'_>, err: CallError) {
    inv.response.add_fatal_cause(err.clone());
    inv.response.set_cause(err);
}

/// Decodes JSON bodies for [`ReturnKind::Json`] methods
pub struct JsonParser;

#[async_trait]
impl Interceptor for JsonParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::After]
    }

    fn priority(&self) -> i32 {
        priority::JSON
    }

    async fn after(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        if inv.descriptor().returns() != ReturnKind::Json {
            return Ok(());
        }
        let Some(body) = inv.response.body.clone() else {
            return Ok(());
        };
        if let Some(mime) = effective_content_type(inv) {
            if !is_json(&mime) {
                debug!(content_type = %mime, "skipping json parser");
                return Ok(());
            }
        }
        if body.is_empty() {
            return Ok(());
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => inv.response.data = Some(Data::Json(value)),
            Err(e) => record_decode_failure(inv, CallError::Decode(format!("invalid json: {}", e))),
        }
        Ok(())
    }
}

impl Handler for JsonParser {
    const NAME: &'static str = "callbox.parser.json";

    fn construct() -> Result<Self, String> {
        Ok(JsonParser)
    }
}

/// Decodes text bodies using the response charset, falling back to the
/// method's configured one
pub struct TextParser;

#[async_trait]
impl Interceptor for TextParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::After]
    }

    fn priority(&self) -> i32 {
        priority::TEXT
    }

    async fn after(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        if inv.descriptor().returns() != ReturnKind::Text {
            return Ok(());
        }
        let Some(body) = inv.response.body.clone() else {
            return Ok(());
        };

        let declared = effective_content_type(inv)
            .and_then(|mime| mime.get_param(mime::CHARSET).map(|c| c.as_str().to_string()));
        let charset = match declared {
            Some(label) => match Charset::from_label(&label) {
                Some(charset) => charset,
                None => {
                    record_decode_failure(inv, CallError::Decode(format!("unsupported charset {}", label)));
                    return Ok(());
                }
            },
            None => inv.config().get(&keys::CHARSET).copied().unwrap_or_default(),
        };

        match charset.decode(&body) {
            Ok(text) => inv.response.data = Some(Data::Text(text)),
            Err(err) => record_decode_failure(inv, err),
        }
        Ok(())
    }
}

impl Handler for TextParser {
    const NAME: &'static str = "callbox.parser.text";

    fn construct() -> Result<Self, String> {
        Ok(TextParser)
    }
}

/// Hands the raw body through for [`ReturnKind::Bytes`] methods
pub struct BytesParser;

#[async_trait]
impl Interceptor for BytesParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::After]
    }

    fn priority(&self) -> i32 {
        priority::BYTES
    }

    async fn after(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        if inv.descriptor().returns() == ReturnKind::Bytes {
            if let Some(body) = inv.response.body.clone() {
                inv.response.data = Some(Data::Bytes(body));
            }
        }
        Ok(())
    }
}

impl Handler for BytesParser {
    const NAME: &'static str = "callbox.parser.bytes";

    fn construct() -> Result<Self, String> {
        Ok(BytesParser)
    }
}
