//! Base64url + JSON helpers and the unsigned three-part compact token format.
//!
//! The compact format is `base64url(header).base64url(payload).signature`. Tokens minted by
//! [`encode_unsigned`] carry `alg = none` and an empty signature segment; they are only used for
//! deep-linking responses, which the platform does not verify in this deployment model.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// JSON object as decoded from a token segment.
pub type JsonObject = Map<String, Value>;

/// Encodes `value` as JSON and returns the unpadded base64url form.
pub fn encode_json<T>(value: &T) -> Result<String>
where
	T: ?Sized + Serialize,
{
	let bytes = serde_json::to_vec(value)?;

	Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decodes an unpadded base64url segment into a JSON object.
///
/// Returns `None` for invalid base64, invalid JSON, or JSON that is not an object.
pub fn decode_json_object(segment: &str) -> Option<JsonObject> {
	match decode_json::<Value>(segment)? {
		Value::Object(map) => Some(map),
		_ => None,
	}
}

/// Decodes an unpadded base64url segment into any deserializable type.
pub fn decode_json<T>(segment: &str) -> Option<T>
where
	T: DeserializeOwned,
{
	let bytes = URL_SAFE_NO_PAD.decode(segment.as_bytes()).ok()?;

	serde_json::from_slice(&bytes).ok()
}

/// Mints an unsigned compact token (`alg = none`, empty signature segment).
pub fn encode_unsigned<T>(payload: &T) -> Result<String>
where
	T: ?Sized + Serialize,
{
	let header = serde_json::json!({ "alg": "none", "typ": "JWT" });

	Ok(format!("{}.{}.", encode_json(&header)?, encode_json(payload)?))
}

/// A compact token split into its decoded header and payload objects.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactToken {
	/// Decoded JOSE header.
	pub header: JsonObject,
	/// Decoded claims object.
	pub payload: JsonObject,
	/// Raw (still encoded) signature segment; empty for unsigned tokens.
	pub signature: String,
}
impl CompactToken {
	/// Parses a three-part compact token, returning `None` when the shape or JSON is invalid.
	pub fn parse(token: &str) -> Option<Self> {
		let mut parts = token.split('.');
		let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);

		if parts.next().is_some() {
			return None;
		}

		Some(Self {
			header: decode_json_object(header)?,
			payload: decode_json_object(payload)?,
			signature: signature.to_owned(),
		})
	}

	/// Returns the `alg` header value when present and a string.
	pub fn algorithm(&self) -> Option<&str> {
		self.header.get("alg").and_then(Value::as_str)
	}
}
