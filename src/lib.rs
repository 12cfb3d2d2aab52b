//! LTI 1.3 launch engine: OIDC login initiation, MAC-signed launch state, ID token claim
//! validation, identity federation into tenant-scoped learner profiles, session issuance, and
//! deep-linking content selection.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod auth;
pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod flows;
#[cfg(feature = "axum")] pub mod http;
pub mod identity;
pub mod obs;
pub mod registry;
pub mod render;
pub mod session;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use serde_json::{Value, json};
	// self
	use crate::{
		auth::{BadgeTemplateId, TenantId},
		claims::LtiLaunchClaims,
		codec,
		config::LaunchConfig,
		flows::{LaunchEngine, LoginInitiationParams, LoginRedirect},
		obs::MemoryErrorSink,
		registry::IssuerRegistryEntry,
		state::{LtiStatePayload, STATE_TTL},
		store::{BadgeTemplate, MemoryStore},
	};

	/// Platform issuer every fixture launches from.
	pub const TEST_ISSUER: &str = "https://canvas.example.edu";
	/// Client identifier registered for [`TEST_ISSUER`].
	pub const TEST_CLIENT_ID: &str = "canvas-client-123";
	/// Tenant [`TEST_ISSUER`] federates into.
	pub const TEST_TENANT_ID: &str = "tenant-123";
	/// Platform authorization endpoint for [`TEST_ISSUER`].
	pub const TEST_AUTHORIZATION_ENDPOINT: &str =
		"https://canvas.example.edu/api/lti/authorize_redirect";
	/// Public base URL of the tool.
	pub const TEST_PLATFORM_BASE_URL: &str = "https://tool.example.edu/";
	/// Target link URI requested at login.
	pub const TEST_TARGET_LINK_URI: &str = "https://tool.example.edu/v1/lti/launch";
	/// State MAC key configured on test engines.
	pub const TEST_STATE_SECRET: &str = "test-state-signing-secret";
	/// Platform subject of the launching user.
	pub const TEST_SUBJECT: &str = "canvas-user-42";
	/// Deployment carried by launch fixtures.
	pub const TEST_DEPLOYMENT_ID: &str = "deployment-1";
	/// Resource link carried by launch fixtures.
	pub const TEST_RESOURCE_LINK_ID: &str = "resource-link-1";
	/// Deep-linking return URL carried by deep-linking fixtures.
	pub const TEST_DEEP_LINK_RETURN_URL: &str = "https://canvas.example.edu/courses/7/deep_links";
	/// LIS instructor membership role.
	pub const INSTRUCTOR_ROLE: &str =
		"http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor";
	/// LIS learner membership role.
	pub const LEARNER_ROLE: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner";

	const FIXTURE_NONCE: &str = "fixture-nonce";
	const ID_TOKEN_TTL: Duration = Duration::hours(1);

	/// Tenant [`TEST_ISSUER`] federates into.
	pub fn test_tenant() -> TenantId {
		TenantId::new(TEST_TENANT_ID).expect("Tenant fixture should be valid.")
	}

	/// Registry entry for [`TEST_ISSUER`].
	pub fn test_issuer_entry(allow_unsigned_id_token: bool) -> IssuerRegistryEntry {
		IssuerRegistryEntry::builder(TEST_ISSUER, test_tenant(), TEST_CLIENT_ID)
			.authorization_endpoint(
				Url::parse(TEST_AUTHORIZATION_ENDPOINT).expect("Endpoint fixture should parse."),
			)
			.allow_unsigned_id_token(allow_unsigned_id_token)
			.build()
			.expect("Registry entry fixture should build.")
	}

	/// Static registry blob registering [`TEST_ISSUER`].
	pub fn test_registry_json(allow_unsigned_id_token: bool) -> String {
		json!([{
			"issuer": TEST_ISSUER,
			"tenantId": TEST_TENANT_ID,
			"authorizationEndpoint": TEST_AUTHORIZATION_ENDPOINT,
			"clientId": TEST_CLIENT_ID,
			"allowUnsignedIdToken": allow_unsigned_id_token,
		}])
		.to_string()
	}

	/// Login initiation parameters for [`TEST_ISSUER`].
	pub fn test_login_params() -> LoginInitiationParams {
		LoginInitiationParams {
			iss: Some(TEST_ISSUER.into()),
			login_hint: Some("opaque-login-hint".into()),
			target_link_uri: Some(TEST_TARGET_LINK_URI.into()),
			..Default::default()
		}
	}

	/// Builds an engine over a fresh in-memory store with [`TEST_ISSUER`] statically
	/// registered, returning the store and error sink for assertions.
	pub fn build_test_engine(
		allow_unsigned_id_token: bool,
	) -> (LaunchEngine, MemoryStore, MemoryErrorSink) {
		let config = LaunchConfig::new(
			Url::parse(TEST_PLATFORM_BASE_URL).expect("Base URL fixture should parse."),
		)
		.with_issuer_registry_json(test_registry_json(allow_unsigned_id_token))
		.with_state_signing_secret(crate::auth::Secret::new(TEST_STATE_SECRET));
		let store = MemoryStore::default();
		let sink = MemoryErrorSink::default();
		let engine = LaunchEngine::new(config, Arc::new(store.clone()))
			.with_error_sink(Arc::new(sink.clone()));

		(engine, store, sink)
	}

	/// Launch claims answering `state`, issued at `now`.
	pub fn test_launch_claims(
		state: &LtiStatePayload,
		now: OffsetDateTime,
		roles: &[&str],
		message_type: &str,
	) -> Value {
		launch_claims(
			&state.iss,
			&state.client_id,
			&state.nonce,
			&state.target_link_uri,
			now,
			roles,
			message_type,
		)
	}

	/// Launch claims answering the login that produced `redirect`.
	pub fn test_launch_claims_for(
		redirect: &LoginRedirect,
		now: OffsetDateTime,
		roles: &[&str],
		message_type: &str,
	) -> Value {
		launch_claims(
			TEST_ISSUER,
			TEST_CLIENT_ID,
			&redirect.nonce,
			TEST_TARGET_LINK_URI,
			now,
			roles,
			message_type,
		)
	}

	/// Unverified compact ID token answering the login that produced `redirect`.
	pub fn test_id_token_for(
		redirect: &LoginRedirect,
		now: OffsetDateTime,
		roles: &[&str],
		message_type: &str,
	) -> String {
		test_unsigned_id_token(&test_launch_claims_for(redirect, now, roles, message_type))
	}

	/// Wraps `claims` in a compact token declaring `RS256` with an unverifiable signature.
	pub fn test_unsigned_id_token(claims: &Value) -> String {
		format!(
			"{}.{}.unverified-signature",
			codec::encode_json(&json!({ "alg": "RS256", "typ": "JWT", "kid": "platform-key-1" }))
				.expect("Header fixture should encode."),
			codec::encode_json(claims).expect("Claims fixture should encode."),
		)
	}

	/// Typed launch claims for identity and reporting tests.
	pub fn test_claims(roles: &[&str], message_type: &str) -> LtiLaunchClaims {
		let now = OffsetDateTime::now_utc();
		let state = LtiStatePayload::new(
			TEST_ISSUER,
			TEST_CLIENT_ID,
			FIXTURE_NONCE,
			"opaque-login-hint",
			TEST_TARGET_LINK_URI,
			now,
			STATE_TTL,
		);

		serde_json::from_value(test_launch_claims(&state, now, roles, message_type))
			.expect("Claims fixture should deserialize.")
	}

	/// Badge template owned by [`test_tenant`].
	pub fn test_badge_template(id: &str, archived: bool) -> BadgeTemplate {
		BadgeTemplate {
			id: BadgeTemplateId::new(id).expect("Template fixture should be valid."),
			tenant_id: test_tenant(),
			slug: format!("{id}-slug"),
			title: format!("Template {id}"),
			description: Some(format!("Awarded for completing {id}.")),
			archived,
		}
	}

	fn launch_claims(
		iss: &str,
		client_id: &str,
		nonce: &str,
		target_link_uri: &str,
		now: OffsetDateTime,
		roles: &[&str],
		message_type: &str,
	) -> Value {
		let iat = now.unix_timestamp();
		let mut claims = json!({
			"iss": iss,
			"sub": TEST_SUBJECT,
			"aud": client_id,
			"exp": iat + ID_TOKEN_TTL.whole_seconds(),
			"iat": iat,
			"nonce": nonce,
			"name": "Ada Lovelace",
			"https://purl.imsglobal.org/spec/lti/claim/deployment_id": TEST_DEPLOYMENT_ID,
			"https://purl.imsglobal.org/spec/lti/claim/message_type": message_type,
			"https://purl.imsglobal.org/spec/lti/claim/version": "1.3.0",
			"https://purl.imsglobal.org/spec/lti/claim/target_link_uri": target_link_uri,
			"https://purl.imsglobal.org/spec/lti/claim/roles": roles,
			"https://purl.imsglobal.org/spec/lti/claim/resource_link": {
				"id": TEST_RESOURCE_LINK_ID,
				"title": "Week 1 badge",
			},
			"https://purl.imsglobal.org/spec/lti/claim/context": {
				"id": "course-7",
				"label": "BADGE-101",
				"title": "Introduction to Badging",
			},
		});

		if message_type == "LtiDeepLinkingRequest" {
			claims["https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings"] = json!({
				"deep_link_return_url": TEST_DEEP_LINK_RETURN_URL,
				"accept_types": ["ltiResourceLink"],
				"accept_multiple": false,
				"data": "opaque-platform-data",
			});
		}

		claims
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;
