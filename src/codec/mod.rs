//! # Wire codec contract.
//!
//! A [`Codec`] turns the raw body of an inbound event into a codec-neutral
//! [`Value`] tree in two steps: [`Codec::read_header`] consumes any framing in
//! front of the body, then [`Codec::read_body`] decodes what is left. The
//! dispatcher then deserializes the value into each handler's declared payload
//! type.
//!
//! Codecs are looked up by the event's `Content-Type` header in
//! [`ServerConfig::codecs`](crate::ServerConfig::codecs). [`JsonCodec`] is
//! registered for `application/json` by default.

mod json;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
pub use serde_json::Value;

use crate::error::CodecError;

pub use json::JsonCodec;

/// Header key carrying the content type of an inbound event.
pub const CONTENT_TYPE: &str = "Content-Type";

/// Kind of message being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// RPC request.
    Request,
    /// RPC response.
    Response,
    /// Pub/sub event.
    Event,
    /// Error reply.
    Error,
}

/// Header frame filled in by [`Codec::read_header`].
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Message id, when the codec carries one.
    pub id: Option<String>,
    /// Target service/topic, when the codec carries one.
    pub target: Option<String>,
    /// Endpoint or method, when the codec carries one.
    pub endpoint: Option<String>,
    /// Framed headers.
    pub header: HashMap<String, String>,
}

/// Content-type specific decoder.
///
/// Every codec decodes into the same self-describing [`Value`] tree, whatever
/// its wire format. Binary formats (protobuf, msgpack, ...) map their fields
/// into that tree; handlers then deserialize their payload type from it, so a
/// handler never depends on which codec delivered the event.
pub trait Codec: Send + Sync + 'static {
    /// Codec name used in logs.
    fn name(&self) -> &str;

    /// Reads the header frame in front of the body, advancing `buf`.
    fn read_header(
        &self,
        buf: &mut Bytes,
        frame: &mut Frame,
        kind: MessageKind,
    ) -> Result<(), CodecError>;

    /// Decodes the remaining bytes of `buf` into a [`Value`].
    ///
    /// Formats without a natural tree form decode to the closest shape, e.g.
    /// a text body as [`Value::String`].
    fn read_body(&self, buf: &mut Bytes) -> Result<Value, CodecError>;
}

/// Codec registry keyed by content type.
pub type Codecs = HashMap<String, Arc<dyn Codec>>;

/// Returns the codecs registered by default.
pub fn default_codecs() -> Codecs {
    let mut codecs: Codecs = HashMap::new();
    codecs.insert("application/json".to_string(), Arc::new(JsonCodec));
    codecs
}

/// Resolves the codec for `content_type`.
pub(crate) fn resolve(codecs: &Codecs, content_type: &str) -> Result<Arc<dyn Codec>, CodecError> {
    codecs
        .get(content_type)
        .cloned()
        .ok_or_else(|| CodecError::UnknownContentType(content_type.to_string()))
}
