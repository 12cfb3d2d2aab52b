//! Session issuance: random opaque token, hashed at rest, delivered as a cookie.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Secret, TenantId, UserId},
	store::{LaunchStore, NewSession, SessionRecord},
};

const SESSION_TOKEN_BYTES: usize = 32;

/// Attributes of the session cookie; `Path=/`, `HttpOnly`, and `SameSite=Lax` are implied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
	/// Cookie name.
	pub name: String,
	/// Raw session token.
	pub value: Secret,
	/// Lifetime in seconds.
	pub max_age: Duration,
	/// Whether the `Secure` attribute is set.
	pub secure: bool,
}

/// Freshly issued session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedSession {
	/// Persisted row (hash only).
	pub record: SessionRecord,
	/// Cookie carrying the raw token.
	pub cookie: SessionCookie,
}

/// Cookie policy applied to every issued session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
	/// Cookie name.
	pub cookie_name: String,
	/// Session lifetime.
	pub ttl: Duration,
	/// Whether cookies carry the `Secure` attribute.
	pub secure: bool,
}

/// Generates a URL-safe random session token.
pub fn generate_session_token() -> Secret {
	let mut bytes = [0_u8; SESSION_TOKEN_BYTES];

	rand::rng().fill_bytes(&mut bytes);

	Secret::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// One-way hash stored in place of the raw token.
pub fn hash_session_token(token: &Secret) -> String {
	hex::encode(Sha256::digest(token.expose().as_bytes()))
}

/// Mints a token, persists its hash, and returns the cookie to set.
///
/// Every call creates a new session; sessions are never reused across launches.
pub async fn issue_session(
	store: &dyn LaunchStore,
	policy: &SessionPolicy,
	tenant_id: &TenantId,
	user_id: &UserId,
	now: OffsetDateTime,
) -> Result<IssuedSession> {
	let token = generate_session_token();
	let record = store
		.create_session(NewSession {
			tenant_id: tenant_id.clone(),
			user_id: user_id.clone(),
			session_token_hash: hash_session_token(&token),
			created_at: now,
			expires_at: now + policy.ttl,
		})
		.await?;

	Ok(IssuedSession {
		record,
		cookie: SessionCookie {
			name: policy.cookie_name.clone(),
			value: token,
			max_age: policy.ttl,
			secure: policy.secure,
		},
	})
}
