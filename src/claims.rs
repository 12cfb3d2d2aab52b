//! LTI 1.3 launch claim parsing and cross-validation against the signed login state.
//!
//! [`validate_launch`] walks the ID token through a fixed sequence: compact parse, algorithm
//! gate, unverified-token gate, schema, cross-checks against the state, then the
//! message-type branch. The first failing step decides the error.

pub mod role;

pub use role::*;

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	codec::CompactToken,
	registry::{self, IssuerRegistryEntry},
	state::LtiStatePayload,
};

/// The only LTI version this engine accepts.
pub const LTI_VERSION: &str = "1.3.0";
/// Content item type offered through deep linking.
pub const LTI_RESOURCE_LINK_TYPE: &str = "ltiResourceLink";
/// Tolerated clock skew for `iat` values in the future, in seconds.
pub const MAX_IAT_SKEW_SECS: i64 = 60;

/// `aud` claim, which platforms send either as a string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
	/// Single audience.
	One(String),
	/// Multiple audiences.
	Many(Vec<String>),
}
impl Audience {
	/// Returns `true` when `client_id` is one of the audiences.
	pub fn contains(&self, client_id: &str) -> bool {
		match self {
			Audience::One(aud) => aud == client_id,
			Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
		}
	}

	fn is_multiple(&self) -> bool {
		matches!(self, Audience::Many(auds) if auds.len() > 1)
	}
}

/// `resource_link` claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLinkClaim {
	/// Stable placement identifier.
	#[serde(default)]
	pub id: Option<String>,
	/// Placement title.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

/// `deep_linking_settings` claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepLinkingSettings {
	/// Platform endpoint receiving the deep-linking response.
	#[serde(default)]
	pub deep_link_return_url: Option<String>,
	/// Content item types the platform accepts.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accept_types: Option<Vec<String>>,
	/// Opaque value that must be echoed back in the response.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	/// Whether several items may be returned at once.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accept_multiple: Option<bool>,
	/// Default title suggested by the platform.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

/// `context` claim (course or section).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextClaim {
	/// Context identifier.
	pub id: String,
	/// Short label, e.g. a course code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	/// Full title.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

/// `lis` claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LisClaim {
	/// Student information system identifier of the person.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub person_sourcedid: Option<String>,
	/// Student information system identifier of the course section.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub course_section_sourcedid: Option<String>,
}

/// Decoded ID token payload of an LTI 1.3 launch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LtiLaunchClaims {
	/// Platform issuer.
	pub iss: String,
	/// Platform-scoped subject identifier.
	pub sub: String,
	/// Audience (tool client identifiers).
	pub aud: Audience,
	/// Expiry, seconds since the epoch.
	pub exp: i64,
	/// Issued-at, seconds since the epoch.
	pub iat: i64,
	/// Nonce echoed from the authorization request.
	pub nonce: String,
	/// Authorized party, required by OIDC when `aud` has several values.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub azp: Option<String>,
	/// Deployment identifier.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/deployment_id")]
	pub deployment_id: String,
	/// Message type, e.g. `LtiResourceLinkRequest`.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/message_type")]
	pub message_type: String,
	/// LTI version.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/version")]
	pub version: String,
	/// Target link URI the platform launched.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/target_link_uri")]
	pub target_link_uri: String,
	/// Resource link placement.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti/claim/resource_link",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub resource_link: Option<ResourceLinkClaim>,
	/// LIS role URIs.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/roles", default)]
	pub roles: Vec<String>,
	/// Deep-linking settings, present on deep-linking requests.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub deep_linking_settings: Option<DeepLinkingSettings>,
	/// Course or section context.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti/claim/context",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub context: Option<ContextClaim>,
	/// Student information system identifiers.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti/claim/lis",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub lis: Option<LisClaim>,
	/// Custom placement parameters.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti/claim/custom",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub custom: Option<Map<String, Value>>,
	/// Email address, when the platform shares it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Full display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Given name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub given_name: Option<String>,
	/// Family name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_name: Option<String>,
}
impl LtiLaunchClaims {
	/// Trimmed, lowercased email address, when present and plausible.
	pub fn normalized_email(&self) -> Option<String> {
		self.email
			.as_deref()
			.map(|email| email.trim().to_ascii_lowercase())
			.filter(|email| email.contains('@'))
	}

	/// Trimmed `lis.person_sourcedid`, when present.
	pub fn sourced_id(&self) -> Option<&str> {
		self.lis
			.as_ref()
			.and_then(|lis| lis.person_sourcedid.as_deref())
			.map(str::trim)
			.filter(|id| !id.is_empty())
	}

	/// Best-effort display name assembled from the name claims.
	pub fn display_name(&self) -> Option<String> {
		if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
			return Some(name.to_owned());
		}

		let parts = [self.given_name.as_deref(), self.family_name.as_deref()]
			.into_iter()
			.flatten()
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>();

		if parts.is_empty() { None } else { Some(parts.join(" ")) }
	}
}

/// Supported LTI message types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LtiMessageType {
	/// `LtiResourceLinkRequest`.
	ResourceLinkRequest,
	/// `LtiDeepLinkingRequest`.
	DeepLinkingRequest,
}
impl LtiMessageType {
	/// Wire value of the message type.
	pub const fn as_str(self) -> &'static str {
		match self {
			LtiMessageType::ResourceLinkRequest => "LtiResourceLinkRequest",
			LtiMessageType::DeepLinkingRequest => "LtiDeepLinkingRequest",
		}
	}

	/// Parses a wire value.
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"LtiResourceLinkRequest" => Some(LtiMessageType::ResourceLinkRequest),
			"LtiDeepLinkingRequest" => Some(LtiMessageType::DeepLinkingRequest),
			_ => None,
		}
	}
}
impl Display for LtiMessageType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Specific reason an ID token was refused.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimRejection {
	/// The token is not a three-part compact token with JSON header and payload.
	MalformedIdToken,
	/// The header carries no `alg`.
	MissingAlgorithm,
	/// The header declares `alg = none`.
	UnsignedAlgorithm,
	/// The payload does not satisfy the LTI 1.3 claim schema.
	SchemaViolation {
		/// Path and parser message.
		detail: String,
	},
	/// The `version` claim is not `1.3.0`.
	UnsupportedVersion {
		/// Version as received.
		version: String,
	},
	/// `iss` differs from the state's issuer.
	IssuerMismatch,
	/// `aud` does not contain the state's client identifier.
	AudienceMismatch,
	/// `azp` is present and differs from the client identifier.
	AuthorizedPartyMismatch,
	/// `nonce` differs from the state's nonce.
	NonceMismatch,
	/// `exp` has passed.
	Expired,
	/// `iat` lies too far in the future.
	IssuedInFuture,
	/// The deployment differs from the one named at login.
	DeploymentMismatch,
	/// The target link URI differs from the one named at login.
	TargetLinkUriMismatch,
	/// A resource-link launch without a `resource_link.id`.
	MissingResourceLinkId,
	/// The deep-link return URL is missing or not an absolute http(s) URL.
	InvalidDeepLinkReturnUrl,
	/// The platform does not accept `ltiResourceLink` items.
	DeepLinkTypeNotAccepted,
	/// The message type is neither resource-link nor deep-linking.
	UnsupportedMessageType {
		/// Message type as received.
		message_type: String,
	},
}
impl ClaimRejection {
	/// Stable machine-readable label.
	pub fn code(&self) -> &'static str {
		match self {
			ClaimRejection::MalformedIdToken => "id_token_malformed",
			ClaimRejection::MissingAlgorithm => "id_token_alg_missing",
			ClaimRejection::UnsignedAlgorithm => "id_token_alg_none",
			ClaimRejection::SchemaViolation { .. } => "claims_invalid",
			ClaimRejection::UnsupportedVersion { .. } => "unsupported_lti_version",
			ClaimRejection::IssuerMismatch => "issuer_mismatch",
			ClaimRejection::AudienceMismatch => "audience_mismatch",
			ClaimRejection::AuthorizedPartyMismatch => "azp_mismatch",
			ClaimRejection::NonceMismatch => "nonce_mismatch",
			ClaimRejection::Expired => "id_token_expired",
			ClaimRejection::IssuedInFuture => "id_token_issued_in_future",
			ClaimRejection::DeploymentMismatch => "deployment_mismatch",
			ClaimRejection::TargetLinkUriMismatch => "target_link_uri_mismatch",
			ClaimRejection::MissingResourceLinkId => "resource_link_missing",
			ClaimRejection::InvalidDeepLinkReturnUrl => "deep_link_return_url_invalid",
			ClaimRejection::DeepLinkTypeNotAccepted => "deep_link_type_not_accepted",
			ClaimRejection::UnsupportedMessageType { .. } => "unsupported_message_type",
		}
	}
}
impl Display for ClaimRejection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			ClaimRejection::MalformedIdToken =>
				f.write_str("id_token is not a valid compact token"),
			ClaimRejection::MissingAlgorithm => f.write_str("id_token header is missing alg"),
			ClaimRejection::UnsignedAlgorithm => f.write_str("id_token alg must not be none"),
			ClaimRejection::SchemaViolation { detail } =>
				write!(f, "id_token claims are invalid: {detail}"),
			ClaimRejection::UnsupportedVersion { version } =>
				write!(f, "unsupported LTI version {version}"),
			ClaimRejection::IssuerMismatch => f.write_str("iss does not match state"),
			ClaimRejection::AudienceMismatch => f.write_str("aud does not contain the client id"),
			ClaimRejection::AuthorizedPartyMismatch =>
				f.write_str("azp does not match the client id"),
			ClaimRejection::NonceMismatch => f.write_str("nonce does not match state"),
			ClaimRejection::Expired => f.write_str("id_token has expired"),
			ClaimRejection::IssuedInFuture => f.write_str("id_token iat is in the future"),
			ClaimRejection::DeploymentMismatch => f.write_str("deployment_id does not match state"),
			ClaimRejection::TargetLinkUriMismatch =>
				f.write_str("target_link_uri does not match state"),
			ClaimRejection::MissingResourceLinkId =>
				f.write_str("LtiResourceLinkRequest requires resource_link.id"),
			ClaimRejection::InvalidDeepLinkReturnUrl =>
				f.write_str("deep_link_return_url must be an absolute http(s) URL"),
			ClaimRejection::DeepLinkTypeNotAccepted =>
				f.write_str("deep linking accept_types must include ltiResourceLink"),
			ClaimRejection::UnsupportedMessageType { message_type } =>
				write!(f, "Unsupported message_type {message_type}"),
		}
	}
}

/// Inputs needed to validate one launch.
#[derive(Clone, Copy, Debug)]
pub struct LaunchContext<'a> {
	/// Validated state payload.
	pub state: &'a LtiStatePayload,
	/// Registry entry resolved for the state's issuer.
	pub entry: &'a IssuerRegistryEntry,
	/// Whether unverified ID tokens may be accepted for this entry in this environment.
	pub accept_unverified: bool,
	/// Validation instant.
	pub now: OffsetDateTime,
}

/// Message-specific data of a validated launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchMessage {
	/// Standard placement launch.
	ResourceLink {
		/// Non-empty `resource_link.id`.
		resource_link_id: String,
	},
	/// Instructor content selection.
	DeepLinking {
		/// Absolute http(s) URL receiving the response.
		return_url: Url,
		/// Settings as received, echoed back in the response.
		settings: DeepLinkingSettings,
	},
}
impl LaunchMessage {
	/// Message type this variant was validated from.
	pub fn message_type(&self) -> LtiMessageType {
		match self {
			LaunchMessage::ResourceLink { .. } => LtiMessageType::ResourceLinkRequest,
			LaunchMessage::DeepLinking { .. } => LtiMessageType::DeepLinkingRequest,
		}
	}
}

/// A launch whose claims passed every check.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedLaunch {
	/// Decoded claims.
	pub claims: LtiLaunchClaims,
	/// Classified role.
	pub role: LtiRole,
	/// Message-specific data.
	pub message: LaunchMessage,
}

/// Parses and cross-validates an ID token against the login state.
pub fn validate_launch(id_token: &str, ctx: &LaunchContext<'_>) -> Result<ValidatedLaunch> {
	let token = CompactToken::parse(id_token).ok_or(ClaimRejection::MalformedIdToken)?;

	check_algorithm(&token)?;

	if !ctx.accept_unverified {
		return Err(Error::SignatureVerificationRequired { issuer: ctx.entry.issuer.clone() });
	}

	let claims = parse_claims(token.payload)?;

	cross_check(&claims, ctx)?;

	let role = classify_roles(&claims.roles);
	let message = classify_message(&claims, role)?;

	Ok(ValidatedLaunch { claims, role, message })
}

/// Normalizes a target link URI to scheme, host, port, and path.
pub fn normalize_target_link_uri(raw: &str) -> Option<String> {
	let url = Url::parse(raw.trim()).ok()?;
	let host = url.host_str()?;
	let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();

	Some(format!("{}://{host}{port}{}", url.scheme(), url.path()))
}

fn check_algorithm(token: &CompactToken) -> Result<(), ClaimRejection> {
	match token.algorithm().map(str::trim) {
		None | Some("") => Err(ClaimRejection::MissingAlgorithm),
		Some(alg) if alg.eq_ignore_ascii_case("none") => Err(ClaimRejection::UnsignedAlgorithm),
		Some(_) => Ok(()),
	}
}

fn parse_claims(payload: Map<String, Value>) -> Result<LtiLaunchClaims, ClaimRejection> {
	let claims: LtiLaunchClaims = serde_path_to_error::deserialize(Value::Object(payload))
		.map_err(|e| ClaimRejection::SchemaViolation {
			detail: format!("{} at `{}`", e.inner(), e.path()),
		})?;
	let required = [
		("iss", &claims.iss),
		("sub", &claims.sub),
		("nonce", &claims.nonce),
		("deployment_id", &claims.deployment_id),
		("message_type", &claims.message_type),
		("target_link_uri", &claims.target_link_uri),
	];

	if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
		return Err(ClaimRejection::SchemaViolation {
			detail: format!("`{name}` must not be empty"),
		});
	}
	if claims.version != LTI_VERSION {
		return Err(ClaimRejection::UnsupportedVersion { version: claims.version.clone() });
	}

	Ok(claims)
}

fn cross_check(claims: &LtiLaunchClaims, ctx: &LaunchContext<'_>) -> Result<(), ClaimRejection> {
	let state = ctx.state;

	if !issuers_match(&claims.iss, &state.iss) {
		return Err(ClaimRejection::IssuerMismatch);
	}
	if !claims.aud.contains(&state.client_id) {
		return Err(ClaimRejection::AudienceMismatch);
	}
	if claims.aud.is_multiple()
		&& claims.azp.as_deref().is_some_and(|azp| azp != state.client_id)
	{
		return Err(ClaimRejection::AuthorizedPartyMismatch);
	}
	if claims.nonce != state.nonce {
		return Err(ClaimRejection::NonceMismatch);
	}

	let now = ctx.now.unix_timestamp();

	if claims.exp <= now {
		return Err(ClaimRejection::Expired);
	}
	if claims.iat > now + MAX_IAT_SKEW_SECS {
		return Err(ClaimRejection::IssuedInFuture);
	}
	if state.lti_deployment_id.as_deref().is_some_and(|expected| expected != claims.deployment_id)
	{
		return Err(ClaimRejection::DeploymentMismatch);
	}
	if normalize_target_link_uri(&claims.target_link_uri)
		.zip(normalize_target_link_uri(&state.target_link_uri))
		.is_none_or(|(claimed, expected)| claimed != expected)
	{
		return Err(ClaimRejection::TargetLinkUriMismatch);
	}

	Ok(())
}

fn issuers_match(claimed: &str, expected: &str) -> bool {
	match (registry::normalize_issuer(claimed), registry::normalize_issuer(expected)) {
		(Some(claimed), Some(expected)) => claimed == expected,
		_ => claimed == expected,
	}
}

fn classify_message(claims: &LtiLaunchClaims, role: LtiRole) -> Result<LaunchMessage> {
	match LtiMessageType::parse(&claims.message_type) {
		Some(LtiMessageType::ResourceLinkRequest) => {
			let resource_link_id = claims
				.resource_link
				.as_ref()
				.and_then(|link| link.id.as_deref())
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.ok_or(ClaimRejection::MissingResourceLinkId)?;

			Ok(LaunchMessage::ResourceLink { resource_link_id: resource_link_id.to_owned() })
		},
		Some(LtiMessageType::DeepLinkingRequest) => {
			if role != LtiRole::Instructor {
				return Err(Error::Forbidden {
					reason: "LtiDeepLinkingRequest requires instructor role".into(),
				});
			}

			let settings = claims.deep_linking_settings.clone().unwrap_or_default();
			let return_url = settings
				.deep_link_return_url
				.as_deref()
				.and_then(|raw| Url::parse(raw.trim()).ok())
				.filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
				.ok_or(ClaimRejection::InvalidDeepLinkReturnUrl)?;

			if settings
				.accept_types
				.as_ref()
				.is_some_and(|types| !types.iter().any(|kind| kind == LTI_RESOURCE_LINK_TYPE))
			{
				return Err(ClaimRejection::DeepLinkTypeNotAccepted.into());
			}

			Ok(LaunchMessage::DeepLinking { return_url, settings })
		},
		None => Err(ClaimRejection::UnsupportedMessageType {
			message_type: claims.message_type.clone(),
		}
		.into()),
	}
}
