// self
use crate::{
	_prelude::*,
	auth::{Secret, TenantId},
};

/// Errors raised while constructing or validating registry entries.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum RegistryEntryError {
	/// The issuer is not an absolute http(s) URL.
	#[error("Issuer must be an absolute http(s) URL: {issuer}.")]
	InvalidIssuer {
		/// Issuer as supplied.
		issuer: String,
	},
	/// Client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Authorization endpoint is required for the OIDC redirect.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Endpoints must be http(s) URLs.
	#[error("The {endpoint} endpoint must be an http(s) URL: {url}.")]
	UnsupportedEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Tenant + client configuration for one LMS issuer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerRegistryEntry {
	/// Normalized issuer (lowercase scheme and host, no default port, no trailing slash).
	pub issuer: String,
	/// Tenant that launches from this issuer federate into.
	pub tenant_id: TenantId,
	/// Platform OIDC authorization endpoint.
	pub authorization_endpoint: Url,
	/// Client identifier the platform assigned to this tool.
	pub client_id: String,
	/// Optional platform token endpoint (service calls).
	pub token_endpoint: Option<Url>,
	/// Optional client secret paired with the token endpoint.
	pub client_secret: Option<Secret>,
	/// Accept ID tokens without signature verification (test deployments only).
	pub allow_unsigned_id_token: bool,
}
impl IssuerRegistryEntry {
	/// Creates a new builder for the provided issuer, tenant, and client identifier.
	pub fn builder(
		issuer: impl Into<String>,
		tenant_id: TenantId,
		client_id: impl Into<String>,
	) -> IssuerRegistryEntryBuilder {
		IssuerRegistryEntryBuilder::new(issuer, tenant_id, client_id)
	}
}

/// Builder for [`IssuerRegistryEntry`] values.
#[derive(Debug)]
pub struct IssuerRegistryEntryBuilder {
	/// Issuer as supplied (normalized during [`build`](Self::build)).
	pub issuer: String,
	/// Tenant identifier.
	pub tenant_id: TenantId,
	/// Client identifier.
	pub client_id: String,
	/// Authorization endpoint (required).
	pub authorization_endpoint: Option<Url>,
	/// Optional token endpoint.
	pub token_endpoint: Option<Url>,
	/// Optional client secret.
	pub client_secret: Option<Secret>,
	/// Unsigned ID token escape hatch.
	pub allow_unsigned_id_token: bool,
}
impl IssuerRegistryEntryBuilder {
	/// Creates a new builder seeded with the required identifiers.
	pub fn new(
		issuer: impl Into<String>,
		tenant_id: TenantId,
		client_id: impl Into<String>,
	) -> Self {
		Self {
			issuer: issuer.into(),
			tenant_id,
			client_id: client_id.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			client_secret: None,
			allow_unsigned_id_token: false,
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the optional token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional client secret.
	pub fn client_secret(mut self, secret: Secret) -> Self {
		self.client_secret = Some(secret);

		self
	}

	/// Toggles acceptance of unverified ID tokens.
	pub fn allow_unsigned_id_token(mut self, allow: bool) -> Self {
		self.allow_unsigned_id_token = allow;

		self
	}

	/// Consumes the builder and validates the resulting entry.
	pub fn build(self) -> Result<IssuerRegistryEntry, RegistryEntryError> {
		let issuer = super::normalize_issuer(&self.issuer)
			.ok_or(RegistryEntryError::InvalidIssuer { issuer: self.issuer.clone() })?;
		let authorization_endpoint = self
			.authorization_endpoint
			.ok_or(RegistryEntryError::MissingAuthorizationEndpoint)?;
		let client_id = self.client_id.trim().to_owned();

		if client_id.is_empty() {
			return Err(RegistryEntryError::EmptyClientId);
		}

		validate_endpoint("authorization", &authorization_endpoint)?;

		if let Some(token) = self.token_endpoint.as_ref() {
			validate_endpoint("token", token)?;
		}

		Ok(IssuerRegistryEntry {
			issuer,
			tenant_id: self.tenant_id,
			authorization_endpoint,
			client_id,
			token_endpoint: self.token_endpoint,
			client_secret: self.client_secret,
			allow_unsigned_id_token: self.allow_unsigned_id_token,
		})
	}
}

/// Wire shape of a registry entry inside the static configuration blob.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawIssuerEntry {
	#[serde(default)]
	pub(crate) issuer: Option<String>,
	pub(crate) tenant_id: TenantId,
	pub(crate) authorization_endpoint: Url,
	pub(crate) client_id: String,
	#[serde(default)]
	pub(crate) token_endpoint: Option<Url>,
	#[serde(default)]
	pub(crate) client_secret: Option<Secret>,
	#[serde(default)]
	pub(crate) allow_unsigned_id_token: bool,
}
impl RawIssuerEntry {
	pub(crate) fn into_entry(
		self,
		issuer: String,
	) -> Result<IssuerRegistryEntry, RegistryEntryError> {
		let mut builder = IssuerRegistryEntry::builder(issuer, self.tenant_id, self.client_id)
			.authorization_endpoint(self.authorization_endpoint)
			.allow_unsigned_id_token(self.allow_unsigned_id_token);

		if let Some(token) = self.token_endpoint {
			builder = builder.token_endpoint(token);
		}
		if let Some(secret) = self.client_secret {
			builder = builder.client_secret(secret);
		}

		builder.build()
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), RegistryEntryError> {
	if matches!(url.scheme(), "http" | "https") && url.has_host() {
		Ok(())
	} else {
		Err(RegistryEntryError::UnsupportedEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn tenant() -> TenantId {
		TenantId::new("tenant-123").expect("Tenant fixture should be valid.")
	}

	fn authorize() -> Url {
		Url::parse("https://canvas.example.edu/api/lti/authorize_redirect")
			.expect("Authorization endpoint fixture should parse.")
	}

	#[test]
	fn builder_normalizes_the_issuer() {
		let entry =
			IssuerRegistryEntry::builder("HTTPS://Canvas.Example.edu:443/", tenant(), " client ")
				.authorization_endpoint(authorize())
				.build()
				.expect("Entry should build.");

		assert_eq!(entry.issuer, "https://canvas.example.edu");
		assert_eq!(entry.client_id, "client");
		assert!(!entry.allow_unsigned_id_token);
	}

	#[test]
	fn builder_requires_an_http_authorization_endpoint() {
		let missing =
			IssuerRegistryEntry::builder("https://canvas.example.edu", tenant(), "c").build();

		assert_eq!(missing, Err(RegistryEntryError::MissingAuthorizationEndpoint));

		let plain_http = IssuerRegistryEntry::builder("https://canvas.example.edu", tenant(), "c")
			.authorization_endpoint(
				Url::parse("http://canvas.example.edu/authorize").expect("URL should parse."),
			)
			.build();

		assert!(plain_http.is_ok());

		let other_scheme = IssuerRegistryEntry::builder("https://canvas.example.edu", tenant(), "c")
			.authorization_endpoint(
				Url::parse("ftp://canvas.example.edu/authorize").expect("URL should parse."),
			)
			.build();

		assert!(matches!(other_scheme, Err(RegistryEntryError::UnsupportedEndpoint { .. })));
	}

	#[test]
	fn builder_rejects_invalid_issuer_and_empty_client() {
		assert!(matches!(
			IssuerRegistryEntry::builder("not a url", tenant(), "c")
				.authorization_endpoint(authorize())
				.build(),
			Err(RegistryEntryError::InvalidIssuer { .. })
		));
		assert_eq!(
			IssuerRegistryEntry::builder("https://canvas.example.edu", tenant(), "  ")
				.authorization_endpoint(authorize())
				.build(),
			Err(RegistryEntryError::EmptyClientId)
		);
	}
}
