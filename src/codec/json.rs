use bytes::Bytes;
use serde_json::Value;

use super::{Codec, Frame, MessageKind};
use crate::error::CodecError;

/// JSON body codec (`application/json`).
///
/// Events carry no header frame; an empty body decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn read_header(
        &self,
        _buf: &mut Bytes,
        _frame: &mut Frame,
        _kind: MessageKind,
    ) -> Result<(), CodecError> {
        Ok(())
    }

    fn read_body(&self, buf: &mut Bytes) -> Result<Value, CodecError> {
        if buf.is_empty() {
            return Ok(Value::Null);
        }
        let body = std::mem::take(buf);
        serde_json::from_slice(&body).map_err(|e| CodecError::Body(e.to_string()))
    }
}
