// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"lti_launch_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a rejection by its stable error code (when enabled).
pub fn record_rejection(kind: FlowKind, code: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("lti_launch_rejection_total", "flow" => kind.as_str(), "code" => code)
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, code);
	}
}
