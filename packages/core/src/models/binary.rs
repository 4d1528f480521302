//! Serde adapter that carries binary payloads as standard base64 text
//!
//! Used for asset bytes inside every JSON artifact the engine writes: the
//! persisted state blob, version snapshots and portable documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        #[serde(with = "super")]
        data: Vec<u8>,
    }

    #[test]
    fn test_payload_is_base64_text() {
        let payload = Payload {
            data: vec![0x89, b'P', b'N', b'G'],
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"data":"iVBORw=="}"#);

        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result: Result<Payload, _> = serde_json::from_str(r#"{"data":"***"}"#);
        assert!(result.is_err());
    }
}
