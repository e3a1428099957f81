use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializes individual values. Framing is handled by [`FrameCodec`](crate::FrameCodec).
pub trait Codec: Clone + Send + Sync + 'static {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON values via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_unit_is_null() {
        assert_eq!(JsonCodec.encode(&()).unwrap(), b"null");
    }

    #[test]
    fn json_decode_error_is_reported() {
        let err = JsonCodec.decode::<u32>(b"\"five\"").unwrap_err();
        assert!(matches!(err, crate::RpcError::Json(_)));
    }
}
