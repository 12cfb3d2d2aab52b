//! OIDC third-party login initiation.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::TenantId,
	config::LaunchConfig,
	flows::LaunchEngine,
	obs::{self, ErrorReport, FlowKind, FlowOutcome, FlowSpan},
	registry::{self, IssuerRegistryEntry},
	state::{self, LtiStatePayload},
};

const NONCE_LEN: usize = 32;

/// Login initiation parameters, accepted from a query string or a form body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInitiationParams {
	/// Platform issuer (required).
	pub iss: Option<String>,
	/// Opaque platform user hint (required).
	pub login_hint: Option<String>,
	/// Tool URL the platform intends to launch (required).
	pub target_link_uri: Option<String>,
	/// Client identifier; must match the registry when present.
	pub client_id: Option<String>,
	/// Opaque platform message hint, passed through.
	pub lti_message_hint: Option<String>,
	/// Deployment identifier, pinned into the state when present.
	pub lti_deployment_id: Option<String>,
}

/// Authorization redirect produced by a successful login initiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRedirect {
	/// Platform authorization URL carrying every OIDC parameter.
	pub location: Url,
	/// Signed state token.
	pub state: String,
	/// Nonce the ID token must echo.
	pub nonce: String,
	/// Normalized issuer of the resolved registry entry.
	pub issuer: String,
	/// Tenant the issuer federates into.
	pub tenant_id: TenantId,
}

struct LoginRequest {
	iss: String,
	login_hint: String,
	target_link_uri: String,
	client_id: Option<String>,
	lti_message_hint: Option<String>,
	lti_deployment_id: Option<String>,
}
impl LoginRequest {
	fn parse(params: LoginInitiationParams) -> Result<Self> {
		let iss = required("iss", params.iss)?;
		let login_hint = required("login_hint", params.login_hint)?;
		let target_link_uri = required("target_link_uri", params.target_link_uri)?;

		if registry::normalize_issuer(&iss).is_none() {
			return Err(Error::invalid_request("iss must be an absolute http(s) URL"));
		}
		if !is_absolute_http_url(&target_link_uri) {
			return Err(Error::invalid_request("target_link_uri must be an absolute http(s) URL"));
		}

		Ok(Self {
			iss,
			login_hint,
			target_link_uri,
			client_id: optional(params.client_id),
			lti_message_hint: optional(params.lti_message_hint),
			lti_deployment_id: optional(params.lti_deployment_id),
		})
	}
}

impl LaunchEngine {
	/// Handles a login initiation at the current instant.
	pub async fn initiate_login(&self, params: LoginInitiationParams) -> Result<LoginRedirect> {
		self.initiate_login_at(params, OffsetDateTime::now_utc()).await
	}

	/// Handles a login initiation at `now`: validates the request, resolves the issuer, and
	/// mints the nonce and signed state for the authorization redirect.
	pub async fn initiate_login_at(
		&self,
		params: LoginInitiationParams,
		now: OffsetDateTime,
	) -> Result<LoginRedirect> {
		const KIND: FlowKind = FlowKind::OidcLogin;

		let span = FlowSpan::new(KIND, "initiate_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let issuer = params.iss.clone().unwrap_or_default();
				let report = ErrorReport::new("lti.oidc_login").tag("issuer", issuer);

				self.login(params, now).await.map_err(|e| self.report_failure(&report, e, false))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(e) => obs::record_flow_failure(KIND, e),
		}

		result
	}

	async fn login(
		&self,
		params: LoginInitiationParams,
		now: OffsetDateTime,
	) -> Result<LoginRedirect> {
		let request = LoginRequest::parse(params)?;
		let entry = self.resolve_issuer(&request.iss).await?;

		if request.client_id.as_deref().is_some_and(|client_id| client_id != entry.client_id) {
			return Err(Error::invalid_request("client_id does not match the registered client"));
		}

		let nonce = generate_nonce();
		let payload = LtiStatePayload::new(
			request.iss.as_str(),
			entry.client_id.as_str(),
			nonce.as_str(),
			request.login_hint.as_str(),
			request.target_link_uri.as_str(),
			now,
			self.config.state_ttl,
		)
		.with_message_hint(request.lti_message_hint.clone())
		.with_deployment_id(request.lti_deployment_id.clone());
		let state = state::sign_state(&payload, &self.config.state_signing_secret)?;
		let location = authorization_redirect(&self.config, &entry, &request, &state, &nonce);

		Ok(LoginRedirect {
			location,
			state,
			nonce,
			issuer: entry.issuer,
			tenant_id: entry.tenant_id,
		})
	}
}

/// Generates a random alphanumeric nonce.
pub fn generate_nonce() -> String {
	rand::rng().sample_iter(&Alphanumeric).take(NONCE_LEN).map(char::from).collect()
}

fn authorization_redirect(
	config: &LaunchConfig,
	entry: &IssuerRegistryEntry,
	request: &LoginRequest,
	state: &str,
	nonce: &str,
) -> Url {
	let mut location = entry.authorization_endpoint.clone();

	{
		let mut query = location.query_pairs_mut();

		query
			.append_pair("scope", "openid")
			.append_pair("response_type", "id_token")
			.append_pair("response_mode", "form_post")
			.append_pair("prompt", "none")
			.append_pair("client_id", &entry.client_id)
			.append_pair("redirect_uri", &config.launch_url())
			.append_pair("login_hint", &request.login_hint)
			.append_pair("state", state)
			.append_pair("nonce", nonce);

		if let Some(hint) = request.lti_message_hint.as_deref() {
			query.append_pair("lti_message_hint", hint);
		}
	}

	location
}

fn required(name: &'static str, value: Option<String>) -> Result<String> {
	optional(value)
		.ok_or_else(|| Error::invalid_request(format!("missing required parameter {name}")))
}

fn optional(value: Option<String>) -> Option<String> {
	value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn is_absolute_http_url(raw: &str) -> bool {
	Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		state::{StateValidation, validate_state},
		store::StoreError,
	};

	const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

	#[test]
	fn nonces_are_alphanumeric_and_unique() {
		let a = generate_nonce();

		assert_eq!(a.len(), NONCE_LEN);
		assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(a, generate_nonce());
	}

	#[tokio::test]
	async fn redirect_carries_parameters_in_order() {
		let (engine, _, _) = build_test_engine(true);
		let redirect = engine
			.initiate_login_at(
				LoginInitiationParams {
					lti_message_hint: Some("hint-1".into()),
					lti_deployment_id: Some("deployment-1".into()),
					client_id: Some(TEST_CLIENT_ID.into()),
					..test_login_params()
				},
				NOW,
			)
			.await
			.expect("Login should succeed.");
		let keys =
			redirect.location.query_pairs().map(|(key, _)| key.into_owned()).collect::<Vec<_>>();

		assert!(redirect.location.as_str().starts_with(
			concat!(
				"https://canvas.example.edu/api/lti/authorize_redirect?",
				"scope=openid&response_type=id_token&response_mode=form_post&prompt=none&",
				"client_id=canvas-client-123&",
			)
		));
		assert_eq!(keys, [
			"scope",
			"response_type",
			"response_mode",
			"prompt",
			"client_id",
			"redirect_uri",
			"login_hint",
			"state",
			"nonce",
			"lti_message_hint"
		]);
		assert_eq!(redirect.tenant_id, test_tenant());

		let pairs = redirect.location.query_pairs().into_owned().collect::<HashMap<_, _>>();

		assert_eq!(pairs["redirect_uri"], "https://tool.example.edu/v1/lti/launch");
		assert_eq!(pairs["nonce"], redirect.nonce);

		let StateValidation::Valid(state) =
			validate_state(&pairs["state"], &engine.config.state_signing_secret, NOW)
		else {
			panic!("State in the redirect should validate.");
		};

		assert_eq!(state.nonce, redirect.nonce);
		assert_eq!(state.client_id, TEST_CLIENT_ID);
		assert_eq!(state.lti_deployment_id.as_deref(), Some("deployment-1"));
		assert_eq!(state.lti_message_hint.as_deref(), Some("hint-1"));
		assert_eq!(state.expires_at, NOW + Duration::minutes(10));
	}

	#[tokio::test]
	async fn invalid_requests_are_rejected_before_resolution() {
		let (engine, store, _) = build_test_engine(true);

		store.set_failure(Some(StoreError::Backend { message: "must not be reached".into() }));

		for (params, needle) in [
			(LoginInitiationParams { iss: None, ..test_login_params() }, "iss"),
			(
				LoginInitiationParams { login_hint: Some("  ".into()), ..test_login_params() },
				"login_hint",
			),
			(
				LoginInitiationParams {
					target_link_uri: Some("/relative".into()),
					..test_login_params()
				},
				"target_link_uri",
			),
			(LoginInitiationParams { iss: Some("canvas".into()), ..test_login_params() }, "iss"),
		] {
			let err =
				engine.initiate_login_at(params, NOW).await.expect_err("Request must be rejected.");

			assert_eq!(err.status_code(), 400);
			assert!(err.to_string().contains(needle), "{err} should mention {needle}.");
		}
	}

	#[tokio::test]
	async fn unknown_issuer_and_client_mismatch_are_client_errors() {
		let (engine, _, sink) = build_test_engine(true);
		let unknown = engine
			.initiate_login_at(
				LoginInitiationParams {
					iss: Some("https://unknown.example.edu".into()),
					..test_login_params()
				},
				NOW,
			)
			.await
			.expect_err("Unknown issuer must be rejected.");

		assert!(matches!(unknown, Error::UnknownIssuer { .. }));
		assert_eq!(unknown.status_code(), 400);

		let mismatch = engine
			.initiate_login_at(
				LoginInitiationParams { client_id: Some("other".into()), ..test_login_params() },
				NOW,
			)
			.await
			.expect_err("Client mismatch must be rejected.");

		assert_eq!(mismatch.code(), "invalid_request");

		let captured = sink.captured();

		assert_eq!(captured.len(), 1, "Only the operator-actionable failure is captured.");
		assert_eq!(captured[0].code, "unknown_issuer");
	}
}
