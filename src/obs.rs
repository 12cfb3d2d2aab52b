//! Observability helpers for the login and launch flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `lti_launch.flow` with the `flow`
//!   (`oidc_login` or `launch`) and `stage` fields, plus `warn` events for rejections.
//! - Enable `metrics` to increment `lti_launch_flow_total` for every attempt/success/failure,
//!   labeled by `flow` + `outcome`, and `lti_launch_rejection_total` labeled by `flow` + `code`.
//!
//! Operator-facing failures are also handed to an [`ErrorSink`] regardless of features.

mod metrics;
mod report;
mod tracing;

pub use metrics::*;
pub use report::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// OIDC third-party login initiation.
	OidcLogin,
	/// ID token launch callback.
	Launch,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::OidcLogin => "oidc_login",
			FlowKind::Launch => "launch",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a failed flow: outcome counter, rejection counter, and a `warn` event.
pub fn record_flow_failure(kind: FlowKind, error: &Error) {
	record_flow_outcome(kind, FlowOutcome::Failure);
	record_rejection(kind, error.code());
	log_rejection(kind, error);
}
