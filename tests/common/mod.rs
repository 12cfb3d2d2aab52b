#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use serde_json::{Value, json};
use time::OffsetDateTime;
// self
use lti_launch::{
	auth::{BadgeTemplateId, Secret, TenantId},
	codec,
	config::LaunchConfig,
	flows::LaunchEngine,
	obs::MemoryErrorSink,
	store::{BadgeTemplate, MemoryStore},
	url::Url,
};

pub const ISSUER: &str = "https://moodle.example.org";
pub const CLIENT_ID: &str = "moodle-client-7";
pub const TENANT_ID: &str = "tenant-moodle";
pub const AUTHORIZATION_ENDPOINT: &str = "https://moodle.example.org/mod/lti/auth.php";
pub const TARGET_LINK_URI: &str = "https://badges.example.org/v1/lti/launch";
pub const DEEP_LINK_RETURN_URL: &str = "https://moodle.example.org/mod/lti/contentitem_return.php";
pub const SUBJECT: &str = "moodle-user-9";
pub const INSTRUCTOR: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor";
pub const LEARNER: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner";

pub fn tenant() -> TenantId {
	TenantId::new(TENANT_ID).expect("Tenant fixture should be valid.")
}

pub fn engine(allow_unsigned_id_token: bool) -> (LaunchEngine, MemoryStore, MemoryErrorSink) {
	let registry = json!({
		ISSUER: {
			"tenantId": TENANT_ID,
			"authorizationEndpoint": AUTHORIZATION_ENDPOINT,
			"clientId": CLIENT_ID,
			"allowUnsignedIdToken": allow_unsigned_id_token,
		}
	});
	let config = LaunchConfig::new(
		Url::parse("https://badges.example.org").expect("Base URL fixture should parse."),
	)
	.with_issuer_registry_json(registry.to_string())
	.with_state_signing_secret(Secret::new("integration-state-secret"));
	let store = MemoryStore::default();
	let sink = MemoryErrorSink::default();
	let engine =
		LaunchEngine::new(config, Arc::new(store.clone())).with_error_sink(Arc::new(sink.clone()));

	(engine, store, sink)
}

pub fn claims(nonce: &str, roles: &[&str], message_type: &str, email: Option<&str>) -> Value {
	let iat = OffsetDateTime::now_utc().unix_timestamp();
	let mut claims = json!({
		"iss": ISSUER,
		"sub": SUBJECT,
		"aud": [CLIENT_ID],
		"exp": iat + 600,
		"iat": iat,
		"nonce": nonce,
		"given_name": "Grace",
		"family_name": "Hopper",
		"https://purl.imsglobal.org/spec/lti/claim/deployment_id": "moodle-deployment",
		"https://purl.imsglobal.org/spec/lti/claim/message_type": message_type,
		"https://purl.imsglobal.org/spec/lti/claim/version": "1.3.0",
		"https://purl.imsglobal.org/spec/lti/claim/target_link_uri": TARGET_LINK_URI,
		"https://purl.imsglobal.org/spec/lti/claim/roles": roles,
		"https://purl.imsglobal.org/spec/lti/claim/resource_link": { "id": "moodle-link-3" },
	});

	if let Some(email) = email {
		claims["email"] = json!(email);
	}
	if message_type == "LtiDeepLinkingRequest" {
		claims["https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings"] = json!({
			"deep_link_return_url": DEEP_LINK_RETURN_URL,
			"accept_types": ["link", "ltiResourceLink"],
			"data": "moodle-opaque",
		});
	}

	claims
}

pub fn id_token(claims: &Value) -> String {
	format!(
		"{}.{}.c2lnbmF0dXJl",
		codec::encode_json(&json!({ "alg": "RS256", "typ": "JWT" }))
			.expect("Header fixture should encode."),
		codec::encode_json(claims).expect("Claims fixture should encode."),
	)
}

pub fn badge_template(id: &str, archived: bool) -> BadgeTemplate {
	BadgeTemplate {
		id: BadgeTemplateId::new(id).expect("Template fixture should be valid."),
		tenant_id: tenant(),
		slug: id.into(),
		title: format!("Badge {id}"),
		description: None,
		archived,
	}
}
