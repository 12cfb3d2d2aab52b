//! Launch orchestrator: OIDC login initiation and the ID token launch callback.
//!
//! ```text
//! LOGIN_INITIATED -> (302) -> LAUNCH_RECEIVED -> VALIDATED_{RESOURCE_LINK|DEEP_LINKING}
//!   -> LINKED -> SESSION_ISSUED -> RESPONSE_RENDERED
//! ```
//!
//! Every validation step short-circuits with a typed [`Error`]; identity linking and session
//! issuance only run once the state and claims are fully validated.

mod deep_link;
mod launch;
mod login;

pub use deep_link::*;
pub use launch::*;
pub use login::*;

// self
use crate::{
	_prelude::*,
	config::LaunchConfig,
	obs::{ErrorReport, ErrorSink, TracingErrorSink},
	registry::{IssuerRegistry, IssuerRegistryEntry},
	store::LaunchStore,
};

/// Coordinates the login and launch flows for every configured issuer.
///
/// The engine holds no per-request state: the issuer registry is rebuilt from configuration and
/// persisted registrations on every call, so registrations added at runtime apply immediately.
#[derive(Clone)]
pub struct LaunchEngine {
	/// Engine configuration.
	pub config: Arc<LaunchConfig>,
	/// Persistence collaborator.
	pub store: Arc<dyn LaunchStore>,
	/// Error-tracking channel for operator-actionable failures.
	pub error_sink: Arc<dyn ErrorSink>,
}
impl LaunchEngine {
	/// Creates an engine that reports failures through [`TracingErrorSink`].
	pub fn new(config: impl Into<Arc<LaunchConfig>>, store: Arc<dyn LaunchStore>) -> Self {
		Self { config: config.into(), store, error_sink: Arc::new(TracingErrorSink) }
	}

	/// Replaces the error-tracking sink.
	pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
		self.error_sink = error_sink;

		self
	}

	/// Merges the static registry with persisted registrations; persisted rows win.
	///
	/// A malformed static blob fails before the store is consulted.
	pub async fn resolve_registry(&self) -> Result<IssuerRegistry> {
		let static_entries = self.config.static_registry()?;
		let persisted = self.store.list_lti_issuer_registrations().await?;

		Ok(IssuerRegistry::merge(static_entries, persisted))
	}

	/// Resolves the registry entry for `issuer`.
	pub async fn resolve_issuer(&self, issuer: &str) -> Result<IssuerRegistryEntry> {
		self.resolve_registry()
			.await?
			.get(issuer)
			.cloned()
			.ok_or_else(|| Error::UnknownIssuer { issuer: issuer.to_owned() })
	}

	fn report_failure(&self, report: &ErrorReport, error: Error, always: bool) -> Error {
		if always || error.is_operator_actionable() {
			self.error_sink.capture_exception(report, &error);
		}

		error
	}
}
impl Debug for LaunchEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LaunchEngine")
			.field("platform_base_url", &self.config.platform_base_url.as_str())
			.field("environment", &self.config.environment)
			.field("static_registry_set", &self.config.issuer_registry_json.is_some())
			.finish()
	}
}
