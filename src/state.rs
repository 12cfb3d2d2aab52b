//! Signed, time-bounded OIDC `state` values carrying the login context across the redirect.
//!
//! A state token is `base64url(JSON(payload)) + "." + base64url(mac)`. The MAC is
//! HMAC-SHA256 keyed with the signing secret over the encoded payload segment. Earlier
//! deployments hashed `payload + "." + secret` with plain SHA-256; tokens produced that way do
//! not validate here, which only matters for logins in flight during an upgrade.
//!
//! Validation never fails with an [`Error`]; it returns a [`StateValidation`] carrying a
//! specific [`StateRejection`] so callers can surface the reason.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
// self
use crate::{_prelude::*, auth::Secret, codec, error::ConfigError};

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of a state token.
pub const STATE_TTL: Duration = Duration::minutes(10);
/// Tolerated clock skew for `issuedAt` values in the future.
pub const MAX_ISSUED_AT_SKEW: Duration = Duration::seconds(30);

/// Login context serialized into the `state` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtiStatePayload {
	/// Issuer exactly as supplied at login initiation.
	pub iss: String,
	/// Client identifier resolved from the issuer registry.
	pub client_id: String,
	/// Nonce that the ID token must echo back.
	pub nonce: String,
	/// Opaque login hint supplied by the platform.
	pub login_hint: String,
	/// Target link URI requested at login initiation.
	pub target_link_uri: String,
	/// Optional platform message hint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lti_message_hint: Option<String>,
	/// Optional deployment identifier hint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lti_deployment_id: Option<String>,
	/// Instant the state was minted.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Instant after which the state is rejected; always `issued_at + ttl`.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl LtiStatePayload {
	/// Creates a payload whose expiry is derived from `issued_at + ttl`.
	pub fn new(
		iss: impl Into<String>,
		client_id: impl Into<String>,
		nonce: impl Into<String>,
		login_hint: impl Into<String>,
		target_link_uri: impl Into<String>,
		issued_at: OffsetDateTime,
		ttl: Duration,
	) -> Self {
		Self {
			iss: iss.into(),
			client_id: client_id.into(),
			nonce: nonce.into(),
			login_hint: login_hint.into(),
			target_link_uri: target_link_uri.into(),
			lti_message_hint: None,
			lti_deployment_id: None,
			issued_at,
			expires_at: issued_at + ttl,
		}
	}

	/// Attaches the optional `lti_message_hint`.
	pub fn with_message_hint(mut self, hint: Option<String>) -> Self {
		self.lti_message_hint = hint;

		self
	}

	/// Attaches the optional `lti_deployment_id`.
	pub fn with_deployment_id(mut self, deployment_id: Option<String>) -> Self {
		self.lti_deployment_id = deployment_id;

		self
	}

	fn has_required_fields(&self) -> bool {
		[&self.iss, &self.client_id, &self.nonce, &self.login_hint, &self.target_link_uri]
			.iter()
			.all(|value| !value.trim().is_empty())
	}
}

/// Specific reason a state token was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateRejection {
	/// The token does not consist of exactly two dot-separated segments.
	MalformedToken,
	/// The recomputed MAC does not match the supplied one.
	SignatureMismatch,
	/// The payload is not JSON or lacks required fields or valid timestamps.
	MalformedPayload,
	/// `issuedAt` lies further in the future than the tolerated skew.
	IssuedInFuture,
	/// `expiresAt` has been reached.
	Expired,
}
impl StateRejection {
	/// Stable machine-readable label.
	pub const fn code(self) -> &'static str {
		match self {
			StateRejection::MalformedToken => "state_malformed",
			StateRejection::SignatureMismatch => "state_signature_mismatch",
			StateRejection::MalformedPayload => "state_payload_invalid",
			StateRejection::IssuedInFuture => "state_issued_in_future",
			StateRejection::Expired => "state_expired",
		}
	}
}
impl Display for StateRejection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let message = match self {
			StateRejection::MalformedToken => "state must contain exactly two segments",
			StateRejection::SignatureMismatch => "state signature mismatch",
			StateRejection::MalformedPayload => "state payload is malformed",
			StateRejection::IssuedInFuture => "state was issued in the future",
			StateRejection::Expired => "state has expired",
		};

		f.write_str(message)
	}
}

/// Outcome of [`validate_state`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValidation {
	/// The token is authentic and within its validity window.
	Valid(LtiStatePayload),
	/// The token was refused for the given reason.
	Invalid(StateRejection),
}
impl StateValidation {
	/// Converts the validation outcome into a [`Result`].
	pub fn into_result(self) -> Result<LtiStatePayload> {
		match self {
			StateValidation::Valid(payload) => Ok(payload),
			StateValidation::Invalid(rejection) => Err(rejection.into()),
		}
	}
}

/// Serializes and signs `payload` with `secret`.
pub fn sign_state(payload: &LtiStatePayload, secret: &Secret) -> Result<String> {
	let encoded = codec::encode_json(payload)?;
	let mac = compute_mac(&encoded, secret).ok_or(ConfigError::StateSecret)?;

	Ok(format!("{encoded}.{mac}"))
}

/// Validates a state token against `secret` at instant `now`.
pub fn validate_state(token: &str, secret: &Secret, now: OffsetDateTime) -> StateValidation {
	match check_state(token, secret, now) {
		Ok(payload) => StateValidation::Valid(payload),
		Err(rejection) => StateValidation::Invalid(rejection),
	}
}

fn check_state(
	token: &str,
	secret: &Secret,
	now: OffsetDateTime,
) -> Result<LtiStatePayload, StateRejection> {
	let mut parts = token.split('.');
	let (Some(encoded), Some(supplied_mac), None) = (parts.next(), parts.next(), parts.next())
	else {
		return Err(StateRejection::MalformedToken);
	};
	let expected_mac = compute_mac(encoded, secret).ok_or(StateRejection::SignatureMismatch)?;

	if !bool::from(expected_mac.as_bytes().ct_eq(supplied_mac.as_bytes())) {
		return Err(StateRejection::SignatureMismatch);
	}

	let payload = codec::decode_json::<LtiStatePayload>(encoded)
		.filter(LtiStatePayload::has_required_fields)
		.ok_or(StateRejection::MalformedPayload)?;

	if payload.issued_at > now + MAX_ISSUED_AT_SKEW {
		return Err(StateRejection::IssuedInFuture);
	}
	if now >= payload.expires_at {
		return Err(StateRejection::Expired);
	}

	Ok(payload)
}

fn compute_mac(encoded_payload: &str, secret: &Secret) -> Option<String> {
	let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes()).ok()?;

	mac.update(encoded_payload.as_bytes());

	Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}
