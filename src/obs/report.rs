// self
use crate::{_prelude::*, auth::TenantId, claims::LtiLaunchClaims};

/// Context attached to a captured failure.
///
/// Only identifiers are carried; secrets, raw tokens, and email addresses never are.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorReport {
	/// Operation that failed, e.g. `lti.launch`.
	pub operation: &'static str,
	/// Tag map (`issuer`, `deployment_id`, `subject`, `tenant_id`, `message_type`).
	pub tags: BTreeMap<&'static str, String>,
}
impl ErrorReport {
	/// Creates an untagged report for `operation`.
	pub fn new(operation: &'static str) -> Self {
		Self { operation, tags: BTreeMap::new() }
	}

	/// Builds the launch report for validated claims.
	pub fn for_claims(
		operation: &'static str,
		tenant_id: &TenantId,
		claims: &LtiLaunchClaims,
	) -> Self {
		Self::new(operation)
			.tag("issuer", &claims.iss)
			.tag("deployment_id", &claims.deployment_id)
			.tag("subject", &claims.sub)
			.tag("tenant_id", tenant_id.as_ref())
			.tag("message_type", &claims.message_type)
	}

	/// Adds or replaces a tag.
	pub fn tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
		self.tags.insert(key, value.into());

		self
	}
}

/// Error-tracking channel for operator-actionable failures.
pub trait ErrorSink
where
	Self: Send + Sync,
{
	/// Records `error` with its context.
	fn capture_exception(&self, report: &ErrorReport, error: &Error);
}

/// Sink that forwards captured failures to `tracing` at `error` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorSink;
impl ErrorSink for TracingErrorSink {
	fn capture_exception(&self, report: &ErrorReport, error: &Error) {
		#[cfg(feature = "tracing")]
		{
			tracing::error!(
				operation = report.operation,
				code = error.code(),
				tags = ?report.tags,
				"{error}"
			);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (report, error);
		}
	}
}

/// One failure captured by [`MemoryErrorSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedError {
	/// Context the failure was reported with.
	pub report: ErrorReport,
	/// Stable error code.
	pub code: &'static str,
	/// Rendered error message.
	pub message: String,
}

/// Sink that keeps captured failures in memory for assertions.
#[derive(Clone, Debug, Default)]
pub struct MemoryErrorSink(Arc<Mutex<Vec<CapturedError>>>);
impl MemoryErrorSink {
	/// Snapshot of every captured failure, oldest first.
	pub fn captured(&self) -> Vec<CapturedError> {
		self.0.lock().clone()
	}
}
impl ErrorSink for MemoryErrorSink {
	fn capture_exception(&self, report: &ErrorReport, error: &Error) {
		self.0.lock().push(CapturedError {
			report: report.clone(),
			code: error.code(),
			message: error.to_string(),
		});
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[test]
	fn claim_reports_carry_only_identifiers() {
		let mut claims = test_claims(&[INSTRUCTOR_ROLE], "LtiResourceLinkRequest");

		claims.email = Some("ada@example.edu".into());

		let report = ErrorReport::for_claims("lti.launch", &test_tenant(), &claims);

		assert_eq!(
			report.tags.keys().copied().collect::<Vec<_>>(),
			["deployment_id", "issuer", "message_type", "subject", "tenant_id"]
		);
		assert!(report.tags.values().all(|value| !value.contains("ada@example.edu")));
	}

	#[test]
	fn memory_sink_records_code_and_context() {
		let sink = MemoryErrorSink::default();
		let report = ErrorReport::new("lti.launch").tag("issuer", TEST_ISSUER);

		sink.capture_exception(&report, &Error::LinkConflict { reason: "email".into() });
		TracingErrorSink
			.capture_exception(&report, &Error::LinkConflict { reason: "email".into() });

		let captured = sink.captured();

		assert_eq!(captured.len(), 1);
		assert_eq!(captured[0].code, "identity_link_conflict");
		assert_eq!(captured[0].report, report);
	}
}
