//! Environment-level configuration for the launch engine.

// crates.io
use ::config::{Config as Settings, Environment as EnvSource, Map};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	error::ConfigError,
	registry::{self, IssuerRegistryEntry},
	session::SessionPolicy,
	state::STATE_TTL,
};

/// OIDC login initiation path.
pub const LOGIN_PATH: &str = "/v1/lti/oidc/login";
/// Launch callback path (the `redirect_uri` sent to every platform).
pub const LAUNCH_PATH: &str = "/v1/lti/launch";
/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(12);
/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "badge_session";

const ENV_PLATFORM_BASE_URL: &str = "PLATFORM_BASE_URL";
const ENV_APP_ENV: &str = "APP_ENV";
const ENV_SESSION_TTL: &str = "LTI_SESSION_TTL_SECONDS";

/// Raw environment settings before validation.
///
/// Field names are the lowercased variable names.
#[derive(Debug, Deserialize)]
struct RawSettings {
	platform_base_url: Option<String>,
	app_env: Option<String>,
	lti_issuer_registry_json: Option<String>,
	lti_state_signing_secret: Option<String>,
	lti_session_ttl_seconds: Option<i64>,
	session_cookie_name: Option<String>,
}
impl RawSettings {
	fn load(source: Option<Map<String, String>>) -> Result<Self, ConfigError> {
		let settings = Settings::builder()
			.add_source(EnvSource::default().ignore_empty(true).source(source))
			.build()?;

		Ok(settings.try_deserialize()?)
	}

	fn validate(self) -> Result<LaunchConfig, ConfigError> {
		let base_url = present(self.platform_base_url)
			.ok_or(ConfigError::MissingVariable { name: ENV_PLATFORM_BASE_URL })?;
		let base_url = Url::parse(&base_url)
			.ok()
			.filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
			.ok_or_else(|| ConfigError::InvalidVariable {
				name: ENV_PLATFORM_BASE_URL,
				reason: "must be an absolute http(s) URL".into(),
			})?;
		let mut config = LaunchConfig::new(base_url);

		if let Some(environment) = present(self.app_env) {
			config = config.with_environment(environment.parse()?);
		}
		if let Some(blob) = present(self.lti_issuer_registry_json) {
			config = config.with_issuer_registry_json(blob);
		}
		if let Some(secret) = present(self.lti_state_signing_secret) {
			config = config.with_state_signing_secret(Secret::new(secret));
		}
		if let Some(seconds) = self.lti_session_ttl_seconds {
			if seconds <= 0 {
				return Err(ConfigError::InvalidVariable {
					name: ENV_SESSION_TTL,
					reason: "must be a positive number of seconds".into(),
				});
			}

			config = config.with_session_ttl(Duration::seconds(seconds));
		}
		if let Some(name) = present(self.session_cookie_name) {
			config = config.with_session_cookie_name(name);
		}

		Ok(config)
	}
}

/// Deployment environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Environment {
	/// Local development; cookies are not marked `Secure`.
	#[default]
	Development,
	/// Automated test deployments.
	Test,
	/// Production; unverified ID tokens are never accepted.
	Production,
}
impl Environment {
	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Environment::Development => "development",
			Environment::Test => "test",
			Environment::Production => "production",
		}
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Environment {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" | "local" => Ok(Environment::Development),
			"test" | "testing" => Ok(Environment::Test),
			"production" | "prod" => Ok(Environment::Production),
			other => Err(ConfigError::InvalidVariable {
				name: ENV_APP_ENV,
				reason: format!("unknown environment `{other}`"),
			}),
		}
	}
}

/// Launch engine configuration.
#[derive(Clone, Debug)]
pub struct LaunchConfig {
	/// Public base URL of the platform; the launch callback hangs off it.
	pub platform_base_url: Url,
	/// Deployment environment.
	pub environment: Environment,
	/// Raw static issuer registry blob, parsed on every resolve.
	pub issuer_registry_json: Option<String>,
	/// Key for state MACs.
	pub state_signing_secret: Secret,
	/// Lifetime of login state tokens.
	pub state_ttl: Duration,
	/// Lifetime of issued sessions.
	pub session_ttl: Duration,
	/// Session cookie name.
	pub session_cookie_name: String,
}
impl LaunchConfig {
	/// Creates a development configuration with a secret derived from the base URL.
	pub fn new(platform_base_url: Url) -> Self {
		let state_signing_secret = derive_state_secret(&platform_base_url);

		Self {
			platform_base_url,
			environment: Environment::default(),
			issuer_registry_json: None,
			state_signing_secret,
			state_ttl: STATE_TTL,
			session_ttl: DEFAULT_SESSION_TTL,
			session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.into(),
		}
	}

	/// Loads the configuration from the process environment, after reading any `.env` file.
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();

		RawSettings::load(None)?.validate()
	}

	/// Loads the configuration from explicit variables instead of the process environment.
	///
	/// Blank values count as absent.
	pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let source = vars.into_iter().map(|(key, value)| (key.into(), value.into())).collect();

		RawSettings::load(Some(source))?.validate()
	}

	/// Sets the deployment environment.
	pub fn with_environment(mut self, environment: Environment) -> Self {
		self.environment = environment;

		self
	}

	/// Sets the raw static issuer registry blob.
	pub fn with_issuer_registry_json(mut self, blob: impl Into<String>) -> Self {
		self.issuer_registry_json = Some(blob.into());

		self
	}

	/// Overrides the derived state signing secret.
	pub fn with_state_signing_secret(mut self, secret: Secret) -> Self {
		self.state_signing_secret = secret;

		self
	}

	/// Overrides the session lifetime.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.session_ttl = ttl;

		self
	}

	/// Overrides the session cookie name.
	pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
		self.session_cookie_name = name.into();

		self
	}

	/// Absolute launch callback URL.
	pub fn launch_url(&self) -> String {
		format!("{}{LAUNCH_PATH}", self.platform_base_url.as_str().trim_end_matches('/'))
	}

	/// Parses the static registry blob; an absent blob yields no entries.
	pub fn static_registry(&self) -> Result<Vec<IssuerRegistryEntry>, ConfigError> {
		match self.issuer_registry_json.as_deref() {
			Some(blob) => registry::parse_static_registry(blob),
			None => Ok(Vec::new()),
		}
	}

	/// Whether `entry` may submit unverified ID tokens in this environment.
	pub fn allows_unsigned_id_tokens(&self, entry: &IssuerRegistryEntry) -> bool {
		entry.allow_unsigned_id_token && self.environment != Environment::Production
	}

	/// Cookie policy for issued sessions.
	pub fn session_policy(&self) -> SessionPolicy {
		SessionPolicy {
			cookie_name: self.session_cookie_name.clone(),
			ttl: self.session_ttl,
			secure: self.environment != Environment::Development,
		}
	}
}

fn present(value: Option<String>) -> Option<String> {
	value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

/// Fallback state secret: SHA-256 over the platform base URL.
///
/// Only suitable for development; anyone who knows the base URL can forge states.
pub fn derive_state_secret(platform_base_url: &Url) -> Secret {
	let digest = Sha256::digest(format!("lti-state:{platform_base_url}").as_bytes());

	Secret::new(hex::encode(digest))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	const BASE_URL: (&str, &str) = ("PLATFORM_BASE_URL", "https://tool.example.edu");

	#[test]
	fn defaults_apply_when_only_the_base_url_is_set() {
		let config = LaunchConfig::from_vars([
			("PLATFORM_BASE_URL", "https://tool.example.edu/"),
			("SESSION_COOKIE_NAME", "  "),
			("LTI_SESSION_TTL_SECONDS", ""),
		])
		.expect("Minimal configuration should load.");

		assert_eq!(config.environment, Environment::Development);
		assert_eq!(config.launch_url(), "https://tool.example.edu/v1/lti/launch");
		assert_eq!(config.session_ttl, Duration::hours(12));
		assert_eq!(config.session_cookie_name, "badge_session");
		assert_eq!(config.state_signing_secret, derive_state_secret(&config.platform_base_url));
		assert!(!config.session_policy().secure);
		assert!(config.static_registry().expect("Absent blob is empty.").is_empty());
	}

	#[test]
	fn every_variable_is_honored() {
		let config = LaunchConfig::from_vars([
			BASE_URL,
			("APP_ENV", "Production"),
			("LTI_ISSUER_REGISTRY_JSON", "[]"),
			("LTI_STATE_SIGNING_SECRET", "configured-secret"),
			("LTI_SESSION_TTL_SECONDS", "3600"),
			("SESSION_COOKIE_NAME", "lti_session"),
		])
		.expect("Full configuration should load.");

		assert_eq!(config.environment, Environment::Production);
		assert_eq!(config.issuer_registry_json.as_deref(), Some("[]"));
		assert_eq!(config.state_signing_secret.expose(), "configured-secret");
		assert_eq!(config.session_ttl, Duration::hours(1));
		assert_eq!(config.session_cookie_name, "lti_session");
		assert!(config.session_policy().secure);
	}

	#[test]
	fn invalid_variables_are_reported_by_name() {
		assert!(matches!(
			LaunchConfig::from_vars::<_, &str, &str>([]),
			Err(ConfigError::MissingVariable { name: "PLATFORM_BASE_URL" })
		));
		assert!(matches!(
			LaunchConfig::from_vars([("PLATFORM_BASE_URL", "tool.example.edu")]),
			Err(ConfigError::InvalidVariable { name: "PLATFORM_BASE_URL", .. })
		));
		assert!(matches!(
			LaunchConfig::from_vars([BASE_URL, ("APP_ENV", "staging")]),
			Err(ConfigError::InvalidVariable { name: "APP_ENV", .. })
		));
		assert!(matches!(
			LaunchConfig::from_vars([BASE_URL, ("LTI_SESSION_TTL_SECONDS", "-5")]),
			Err(ConfigError::InvalidVariable { name: "LTI_SESSION_TTL_SECONDS", .. })
		));
		assert!(matches!(
			LaunchConfig::from_vars([BASE_URL, ("LTI_SESSION_TTL_SECONDS", "twelve hours")]),
			Err(ConfigError::Load { .. })
		));
	}

	#[test]
	fn unsigned_tokens_are_never_honored_in_production() {
		let entry = test_issuer_entry(true);
		let base = Url::parse("https://tool.example.edu").expect("Base URL should parse.");

		assert!(LaunchConfig::new(base.clone()).allows_unsigned_id_tokens(&entry));
		assert!(
			LaunchConfig::new(base.clone())
				.with_environment(Environment::Test)
				.allows_unsigned_id_tokens(&entry)
		);
		assert!(
			!LaunchConfig::new(base.clone())
				.with_environment(Environment::Production)
				.allows_unsigned_id_tokens(&entry)
		);
		assert!(!LaunchConfig::new(base).allows_unsigned_id_tokens(&test_issuer_entry(false)));
	}
}
