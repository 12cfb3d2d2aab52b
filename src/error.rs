//! Launch-level error types shared by the state, claims, identity, and HTTP layers.
//!
//! Every variant maps onto exactly one HTTP status via [`Error::status_code`] and exposes a
//! stable machine-readable label via [`Error::code`], so the HTTP surface can always report
//! *why* a launch was refused.

// self
use crate::{_prelude::*, claims::ClaimRejection, state::StateRejection};

/// Launch-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical launch error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Persistence collaborator failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem (registry blob, platform URL, secrets).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// JSON encoding of an outbound token failed.
	#[error("Failed to encode token payload.")]
	Encode(#[from] serde_json::Error),
	/// An HTML page failed to render.
	#[error("Failed to render launch page.")]
	Render(#[from] askama::Error),

	/// Login or launch request parameters are missing or malformed.
	#[error("Invalid LTI request: {reason}.")]
	InvalidRequest {
		/// Human-readable reason string.
		reason: String,
	},
	/// The `state` parameter failed validation.
	#[error("Invalid LTI state: {0}.")]
	InvalidState(StateRejection),
	/// The ID token claims failed parsing or cross-validation.
	#[error("Invalid LTI launch: {0}.")]
	InvalidClaims(ClaimRejection),
	/// No registry entry exists for the issuer.
	#[error("Unknown LTI issuer: {issuer}.")]
	UnknownIssuer {
		/// Issuer as supplied by the caller.
		issuer: String,
	},
	/// The launch is well formed but the caller's role may not perform it.
	#[error("Forbidden: {reason}.")]
	Forbidden {
		/// Human-readable reason string.
		reason: String,
	},
	/// The issuer is not allowed to submit unverified ID tokens.
	#[error("ID token from issuer {issuer} requires signature verification.")]
	SignatureVerificationRequired {
		/// Normalized issuer identifier.
		issuer: String,
	},
	/// A secondary identity is already linked to a different learner profile.
	#[error("Identity link conflict: {reason}.")]
	LinkConflict {
		/// Human-readable reason string.
		reason: String,
	},
}
impl Error {
	/// Builds an [`Error::InvalidRequest`] from any displayable reason.
	pub fn invalid_request(reason: impl Into<String>) -> Self {
		Self::InvalidRequest { reason: reason.into() }
	}

	/// HTTP status code the error should surface as.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::InvalidRequest { .. }
			| Error::InvalidState(_)
			| Error::InvalidClaims(_)
			| Error::UnknownIssuer { .. } => 400,
			Error::Forbidden { .. } => 403,
			Error::SignatureVerificationRequired { .. } => 501,
			Error::Storage(_)
			| Error::Config(_)
			| Error::Encode(_)
			| Error::Render(_)
			| Error::LinkConflict { .. } => 500,
		}
	}

	/// Stable machine-readable label for the failure class.
	pub fn code(&self) -> &'static str {
		match self {
			Error::Storage(_) => "storage_error",
			Error::Config(_) => "configuration_error",
			Error::Encode(_) => "encoding_error",
			Error::Render(_) => "render_error",
			Error::InvalidRequest { .. } => "invalid_request",
			Error::InvalidState(rejection) => rejection.code(),
			Error::InvalidClaims(rejection) => rejection.code(),
			Error::UnknownIssuer { .. } => "unknown_issuer",
			Error::Forbidden { .. } => "forbidden",
			Error::SignatureVerificationRequired { .. } => "signature_verification_required",
			Error::LinkConflict { .. } => "identity_link_conflict",
		}
	}

	/// Returns `true` when the failure is operator-actionable rather than caller-actionable.
	pub fn is_operator_actionable(&self) -> bool {
		matches!(
			self,
			Error::Storage(_)
				| Error::Config(_)
				| Error::Encode(_)
				| Error::Render(_)
				| Error::UnknownIssuer { .. }
				| Error::SignatureVerificationRequired { .. }
				| Error::LinkConflict { .. }
		)
	}
}
impl From<StateRejection> for Error {
	fn from(rejection: StateRejection) -> Self {
		Self::InvalidState(rejection)
	}
}
impl From<ClaimRejection> for Error {
	fn from(rejection: ClaimRejection) -> Self {
		Self::InvalidClaims(rejection)
	}
}

/// Configuration and validation failures raised while loading or resolving settings.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The static issuer registry blob is not valid JSON of the expected shape.
	#[error("Issuer registry configuration is malformed at `{path}`: {message}.")]
	RegistryParse {
		/// JSON path where parsing failed.
		path: String,
		/// Parser message.
		message: String,
	},
	/// A registry entry failed validation.
	#[error("Issuer registry entry `{issuer}` is invalid.")]
	InvalidRegistryEntry {
		/// Issuer as written in the configuration.
		issuer: String,
		/// Underlying validation failure.
		#[source]
		source: crate::registry::RegistryEntryError,
	},
	/// The environment could not be read into the raw settings shape.
	#[error("Environment configuration could not be loaded.")]
	Load {
		/// Underlying loader failure.
		#[from]
		source: ::config::ConfigError,
	},
	/// A required environment variable is absent.
	#[error("Environment variable {name} is required.")]
	MissingVariable {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds an unusable value.
	#[error("Environment variable {name} is invalid: {reason}.")]
	InvalidVariable {
		/// Variable name.
		name: &'static str,
		/// Human-readable reason string.
		reason: String,
	},
	/// The state signing key could not be used to initialise the MAC.
	#[error("State signing secret cannot be used as a MAC key.")]
	StateSecret,
}
impl ConfigError {
	/// Converts a path-aware serde failure into [`ConfigError::RegistryParse`].
	pub fn registry_parse(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::RegistryParse { path: e.path().to_string(), message: e.inner().to_string() }
	}
}
