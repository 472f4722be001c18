//! Text encodings for blobs exchanged by copy/paste

use crate::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How binary blobs are rendered for manual exchange
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// Standard base64 with padding
    #[default]
    Base64,
    /// Lowercase hex
    Hex,
}

impl TextEncoding {
    /// Encode bytes as text
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
            Self::Hex => hex::encode(bytes),
        }
    }

    /// Decode text, ignoring whitespace introduced by line wrapping or pasting
    pub fn decode(&self, text: &str) -> Result<Vec<u8>> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match self {
            Self::Base64 => Ok(base64::engine::general_purpose::STANDARD.decode(compact)?),
            Self::Hex => Ok(hex::decode(compact)?),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" | "b64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(format!("unknown encoding '{}', expected base64 or hex", other)),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base64 => f.write_str("base64"),
            Self::Hex => f.write_str("hex"),
        }
    }
}

/// Serde adapter storing byte vectors as base64 strings
pub(crate) mod base64_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for fixed-size byte arrays stored as base64 strings
pub(crate) mod base64_array {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::base64_serde::serialize(bytes, s)
    }

    pub fn deserialize<'de, D, const N: usize>(d: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = super::base64_serde::deserialize(d)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TextEncoding::Base64)]
    #[case(TextEncoding::Hex)]
    fn test_roundtrip(#[case] encoding: TextEncoding) {
        let data: Vec<u8> = (0..=255u8).collect();
        let text = encoding.encode(&data);
        assert_eq!(encoding.decode(&text).unwrap(), data);
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        let text = "aGVsbG8g\n  dGVzdA==\r\n";
        assert_eq!(TextEncoding::Base64.decode(text).unwrap(), b"hello test");
    }

    #[test]
    fn test_invalid_text_is_rejected() {
        assert!(TextEncoding::Hex.decode("zz").unwrap_err().is_serialization());
        assert!(TextEncoding::Base64.decode("***").unwrap_err().is_serialization());
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Fixed {
        #[serde(with = "base64_array")]
        id: [u8; 4],
    }

    #[test]
    fn test_fixed_array_length_enforced() {
        let json = serde_json::to_string(&Fixed { id: [1, 2, 3, 4] }).unwrap();
        assert_eq!(json, r#"{"id":"AQIDBA=="}"#);
        assert_eq!(serde_json::from_str::<Fixed>(&json).unwrap().id, [1, 2, 3, 4]);
        assert!(serde_json::from_str::<Fixed>(r#"{"id":"AQID"}"#).is_err());
    }

    #[rstest]
    #[case("base64", TextEncoding::Base64)]
    #[case("B64", TextEncoding::Base64)]
    #[case("HEX", TextEncoding::Hex)]
    fn test_from_str(#[case] input: &str, #[case] expected: TextEncoding) {
        assert_eq!(input.parse::<TextEncoding>().unwrap(), expected);
    }
}
