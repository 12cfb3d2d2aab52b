//! Deep-linking content selection: one `ltiResourceLink` option per active badge template.
//!
//! Each option carries its own unsigned response token holding exactly one content item, so
//! whichever form the instructor submits returns a single placement to the platform.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::BadgeTemplateId,
	claims::{DeepLinkingSettings, LTI_RESOURCE_LINK_TYPE, LTI_VERSION, LtiLaunchClaims},
	codec,
	flows::{LaunchEngine, generate_nonce},
	registry::IssuerRegistryEntry,
	store::BadgeTemplate,
};

/// Lifetime of a deep-linking response token.
pub const DEEP_LINK_RESPONSE_TTL: Duration = Duration::seconds(300);
/// Query parameter (and custom claim) naming the selected template.
pub const BADGE_TEMPLATE_PARAM: &str = "badgeTemplateId";

const DEEP_LINKING_RESPONSE: &str = "LtiDeepLinkingResponse";

/// A selectable template and the response token that places it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeepLinkOption {
	/// Template offered.
	pub template_id: BadgeTemplateId,
	/// Template title.
	pub title: String,
	/// Template description.
	pub description: Option<String>,
	/// Launch URL the platform will store for the placement.
	pub launch_url: String,
	/// Unsigned compact response token posted back as `JWT`.
	pub jwt: String,
}

/// `ltiResourceLink` content item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
	/// Always `ltiResourceLink`.
	#[serde(rename = "type")]
	pub kind: String,
	/// Placement title.
	pub title: String,
	/// Placement description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	/// Launch URL of the placement.
	pub url: String,
	/// Custom parameters the platform sends back on launch.
	pub custom: Map<String, Value>,
}

/// Payload of a deep-linking response token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeepLinkingResponseClaims {
	/// Tool client identifier.
	pub iss: String,
	/// Platform issuer.
	pub aud: String,
	/// Issued-at, seconds since the epoch.
	pub iat: i64,
	/// Expiry, seconds since the epoch.
	pub exp: i64,
	/// Fresh nonce.
	pub nonce: String,
	/// Deployment echoed from the request.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/deployment_id")]
	pub deployment_id: String,
	/// Always `LtiDeepLinkingResponse`.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/message_type")]
	pub message_type: String,
	/// Always `1.3.0`.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti/claim/version")]
	pub version: String,
	/// Selected items.
	#[serde(rename = "https://purl.imsglobal.org/spec/lti-dl/claim/content_items")]
	pub content_items: Vec<ContentItem>,
	/// `deep_linking_settings.data` echoed verbatim.
	#[serde(
		rename = "https://purl.imsglobal.org/spec/lti-dl/claim/data",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub data: Option<String>,
}

impl LaunchEngine {
	/// Builds one option per non-archived template of the entry's tenant.
	pub async fn deep_link_options(
		&self,
		entry: &IssuerRegistryEntry,
		claims: &LtiLaunchClaims,
		settings: &DeepLinkingSettings,
		now: OffsetDateTime,
	) -> Result<Vec<DeepLinkOption>> {
		let templates = self.store.list_badge_templates(&entry.tenant_id).await?;

		templates
			.iter()
			.filter(|template| !template.archived)
			.map(|template| build_option(entry, claims, settings, template, now))
			.collect()
	}
}

/// Appends `badgeTemplateId` to the launched target link URI.
pub fn template_launch_url(target_link_uri: &str, template_id: &BadgeTemplateId) -> Result<String> {
	let mut url = Url::parse(target_link_uri.trim())
		.map_err(|_| Error::invalid_request("target_link_uri is not a valid URL"))?;

	url.query_pairs_mut().append_pair(BADGE_TEMPLATE_PARAM, template_id);

	Ok(url.into())
}

fn build_option(
	entry: &IssuerRegistryEntry,
	claims: &LtiLaunchClaims,
	settings: &DeepLinkingSettings,
	template: &BadgeTemplate,
	now: OffsetDateTime,
) -> Result<DeepLinkOption> {
	let launch_url = template_launch_url(&claims.target_link_uri, &template.id)?;
	let mut custom = Map::new();

	custom.insert(BADGE_TEMPLATE_PARAM.into(), Value::from(template.id.to_string()));

	let item = ContentItem {
		kind: LTI_RESOURCE_LINK_TYPE.into(),
		title: template.title.clone(),
		text: template.description.clone(),
		url: launch_url.clone(),
		custom,
	};
	let iat = now.unix_timestamp();
	let response = DeepLinkingResponseClaims {
		iss: entry.client_id.clone(),
		aud: claims.iss.clone(),
		iat,
		exp: iat + DEEP_LINK_RESPONSE_TTL.whole_seconds(),
		nonce: generate_nonce(),
		deployment_id: claims.deployment_id.clone(),
		message_type: DEEP_LINKING_RESPONSE.into(),
		version: LTI_VERSION.into(),
		content_items: vec![item],
		data: settings.data.clone(),
	};

	Ok(DeepLinkOption {
		template_id: template.id.clone(),
		title: template.title.clone(),
		description: template.description.clone(),
		launch_url,
		jwt: codec::encode_unsigned(&response)?,
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{_preludet::*, codec::CompactToken};

	const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

	#[test]
	fn template_parameter_is_appended_to_existing_query() {
		let id = BadgeTemplateId::new("tpl-1").expect("Template fixture should be valid.");

		assert_eq!(
			template_launch_url("https://tool.example.edu/v1/lti/launch", &id)
				.expect("URL should build."),
			"https://tool.example.edu/v1/lti/launch?badgeTemplateId=tpl-1"
		);
		assert_eq!(
			template_launch_url("https://tool.example.edu/launch?course=9", &id)
				.expect("URL should build."),
			"https://tool.example.edu/launch?course=9&badgeTemplateId=tpl-1"
		);
		assert!(template_launch_url("not a url", &id).is_err());
	}

	#[tokio::test]
	async fn options_skip_archived_templates_and_carry_response_tokens() {
		let (engine, store, _) = build_test_engine(true);
		let entry = test_issuer_entry(true);
		let claims = test_claims(&[INSTRUCTOR_ROLE], "LtiDeepLinkingRequest");
		let settings = claims.deep_linking_settings.clone().expect("Fixture carries settings.");

		store.insert_badge_template(test_badge_template("tpl-1", false));
		store.insert_badge_template(test_badge_template("tpl-2", true));

		let options = engine
			.deep_link_options(&entry, &claims, &settings, NOW)
			.await
			.expect("Options should build.");

		assert_eq!(options.len(), 1);
		assert_eq!(store.badge_template_list_calls(), 1);

		let token = CompactToken::parse(&options[0].jwt).expect("Response token should parse.");

		assert_eq!(token.algorithm(), Some("none"));
		assert!(token.signature.is_empty());

		let response: DeepLinkingResponseClaims =
			serde_json::from_value(Value::Object(token.payload)).expect("Payload should decode.");

		assert_eq!(response.iss, TEST_CLIENT_ID);
		assert_eq!(response.aud, TEST_ISSUER);
		assert_eq!(response.exp - response.iat, 300);
		assert_eq!(response.message_type, "LtiDeepLinkingResponse");
		assert_eq!(response.version, "1.3.0");
		assert_eq!(response.deployment_id, claims.deployment_id);
		assert_eq!(response.data, settings.data);
		assert_ne!(response.nonce, claims.nonce);
		assert_eq!(response.content_items.len(), 1);
		assert_eq!(response.content_items[0].kind, "ltiResourceLink");
		assert_eq!(response.content_items[0].url, options[0].launch_url);
		assert_eq!(response.content_items[0].custom["badgeTemplateId"], "tpl-1");
	}

	#[tokio::test]
	async fn no_active_templates_yield_no_options() {
		let (engine, store, _) = build_test_engine(true);
		let claims = test_claims(&[INSTRUCTOR_ROLE], "LtiDeepLinkingRequest");

		store.insert_badge_template(test_badge_template("tpl-archived", true));

		let options = engine
			.deep_link_options(
				&test_issuer_entry(true),
				&claims,
				&DeepLinkingSettings::default(),
				NOW,
			)
			.await
			.expect("Listing should succeed.");

		assert!(options.is_empty());
	}
}
