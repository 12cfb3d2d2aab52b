//! ID token launch callback.

// self
use crate::{
	_prelude::*,
	auth::TenantId,
	claims::{self, LaunchContext, LaunchMessage, LtiRole, ValidatedLaunch},
	flows::{DeepLinkOption, LaunchEngine},
	identity::{self, LinkedIdentity},
	obs::{self, ErrorReport, FlowKind, FlowOutcome, FlowSpan},
	registry::IssuerRegistryEntry,
	render::{self, ResourceLinkView},
	session::{self, IssuedSession},
	state,
};

const LAUNCH_OPERATION: &str = "lti.launch";

/// Form body posted by the platform to the launch callback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchForm {
	/// ID token issued by the platform.
	pub id_token: Option<String>,
	/// State minted at login initiation.
	pub state: Option<String>,
}

/// What the launch resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
	/// Resource-link launch completed.
	ResourceLink {
		/// Launched placement.
		resource_link_id: String,
	},
	/// Deep-linking selection page rendered.
	DeepLinking {
		/// Platform endpoint the options post to.
		return_url: Url,
		/// Offered templates.
		options: Vec<DeepLinkOption>,
	},
}

/// Successful launch.
#[derive(Clone, Debug)]
pub struct LaunchResponse {
	/// Message-specific outcome.
	pub outcome: LaunchOutcome,
	/// Classified role.
	pub role: LtiRole,
	/// Tenant the user was federated into.
	pub tenant_id: TenantId,
	/// Identity linking result.
	pub identity: LinkedIdentity,
	/// Freshly issued session and its cookie.
	pub session: IssuedSession,
	/// Rendered page.
	pub html: String,
}

impl LaunchEngine {
	/// Handles a launch callback at the current instant.
	pub async fn complete_launch(&self, form: LaunchForm) -> Result<LaunchResponse> {
		self.complete_launch_at(form, OffsetDateTime::now_utc()).await
	}

	/// Handles a launch callback at `now`.
	///
	/// State and claims are fully validated before any write. Failures after validation are
	/// always reported to the error sink with claim context; earlier failures only when they
	/// are operator-actionable.
	pub async fn complete_launch_at(
		&self,
		form: LaunchForm,
		now: OffsetDateTime,
	) -> Result<LaunchResponse> {
		const KIND: FlowKind = FlowKind::Launch;

		let span = FlowSpan::new(KIND, "complete_launch");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.launch(form, now)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(e) => obs::record_flow_failure(KIND, e),
		}

		result
	}

	async fn launch(&self, form: LaunchForm, now: OffsetDateTime) -> Result<LaunchResponse> {
		let id_token = required("id_token", form.id_token)?;
		let state_token = required("state", form.state)?;
		let state = state::validate_state(&state_token, &self.config.state_signing_secret, now)
			.into_result()?;
		let report = ErrorReport::new(LAUNCH_OPERATION).tag("issuer", &state.iss);
		let entry = self
			.resolve_issuer(&state.iss)
			.await
			.map_err(|e| self.report_failure(&report, e, false))?;
		let ctx = LaunchContext {
			state: &state,
			entry: &entry,
			accept_unverified: self.config.allows_unsigned_id_tokens(&entry),
			now,
		};
		let report = report.tag("tenant_id", entry.tenant_id.as_ref());
		let launch = claims::validate_launch(&id_token, &ctx)
			.map_err(|e| self.report_failure(&report, e, false))?;
		let report = ErrorReport::for_claims(LAUNCH_OPERATION, &entry.tenant_id, &launch.claims);

		self.link_and_render(&entry, launch, now)
			.await
			.map_err(|e| self.report_failure(&report, e, true))
	}

	async fn link_and_render(
		&self,
		entry: &IssuerRegistryEntry,
		launch: ValidatedLaunch,
		now: OffsetDateTime,
	) -> Result<LaunchResponse> {
		let ValidatedLaunch { claims, role, message } = launch;
		let identity = identity::link_identity(
			self.store.as_ref(),
			&entry.tenant_id,
			&entry.issuer,
			&claims,
			role,
		)
		.await?;
		let session = session::issue_session(
			self.store.as_ref(),
			&self.config.session_policy(),
			&entry.tenant_id,
			&identity.user.id,
			now,
		)
		.await?;
		let (outcome, html) = match message {
			LaunchMessage::ResourceLink { resource_link_id } => {
				let display_name = claims.display_name();
				let html = render::resource_link_page(&ResourceLinkView {
					tenant_id: entry.tenant_id.as_ref(),
					resource_link_id: &resource_link_id,
					role,
					display_name: display_name.as_deref(),
					context_title: claims.context.as_ref().and_then(|c| c.title.as_deref()),
				})?;

				(LaunchOutcome::ResourceLink { resource_link_id }, html)
			},
			LaunchMessage::DeepLinking { return_url, settings } => {
				let options = self.deep_link_options(entry, &claims, &settings, now).await?;
				let html = render::deep_link_page(&return_url, &options)?;

				(LaunchOutcome::DeepLinking { return_url, options }, html)
			},
		};

		Ok(LaunchResponse {
			outcome,
			role,
			tenant_id: entry.tenant_id.clone(),
			identity,
			session,
			html,
		})
	}
}

fn required(name: &'static str, value: Option<String>) -> Result<String> {
	value
		.map(|value| value.trim().to_owned())
		.filter(|value| !value.is_empty())
		.ok_or_else(|| Error::invalid_request(format!("missing required parameter {name}")))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		claims::ClaimRejection,
		state::StateRejection,
		store::{IdentityType, LaunchStore, MembershipRole, StoreError},
	};

	const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

	async fn login(engine: &LaunchEngine) -> crate::flows::LoginRedirect {
		engine.initiate_login_at(test_login_params(), NOW).await.expect("Login should succeed.")
	}

	#[tokio::test]
	async fn missing_form_fields_are_invalid_requests() {
		let (engine, _, _) = build_test_engine(true);

		for form in [
			LaunchForm { id_token: None, state: Some("s".into()) },
			LaunchForm { id_token: Some("t".into()), state: Some(" ".into()) },
		] {
			let err =
				engine.complete_launch_at(form, NOW).await.expect_err("Form must be rejected.");

			assert_eq!(err.code(), "invalid_request");
		}
	}

	#[tokio::test]
	async fn tampered_or_expired_state_stops_before_any_write() {
		let (engine, store, _) = build_test_engine(true);
		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[INSTRUCTOR_ROLE], "LtiResourceLinkRequest");
		let tampered = format!("{}x", redirect.state);
		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token.clone()), state: Some(tampered) },
				NOW,
			)
			.await
			.expect_err("Tampered state must be rejected.");

		assert!(matches!(err, Error::InvalidState(StateRejection::SignatureMismatch)));

		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state.clone()) },
				NOW + Duration::minutes(10),
			)
			.await
			.expect_err("Expired state must be rejected.");

		assert!(matches!(err, Error::InvalidState(StateRejection::Expired)));
		assert_eq!(store.profile_count(), 0);
		assert!(store.sessions().is_empty());
	}

	#[tokio::test]
	async fn resource_link_launch_links_and_issues_a_session() {
		let (engine, store, _) = build_test_engine(true);
		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[INSTRUCTOR_ROLE], "LtiResourceLinkRequest");
		let response = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state.clone()) },
				NOW + Duration::seconds(5),
			)
			.await
			.expect("Launch should succeed.");

		assert!(response.html.contains("LTI 1.3 launch complete"));
		assert_eq!(response.outcome, LaunchOutcome::ResourceLink {
			resource_link_id: "resource-link-1".into()
		});
		assert_eq!(response.identity.membership.role, MembershipRole::Issuer);
		assert_eq!(
			store.membership(&response.tenant_id, &response.identity.user.id),
			Some(MembershipRole::Issuer)
		);
		assert_eq!(store.sessions().len(), 1);
		assert_eq!(response.session.record, store.sessions()[0]);
	}

	#[tokio::test]
	async fn nonce_replay_is_rejected() {
		let (engine, store, _) = build_test_engine(true);
		let first = login(&engine).await;
		let second = login(&engine).await;
		let token = test_id_token_for(&first, NOW, &[LEARNER_ROLE], "LtiResourceLinkRequest");
		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(second.state) },
				NOW,
			)
			.await
			.expect_err("Nonce from another login must be rejected.");

		assert!(matches!(err, Error::InvalidClaims(ClaimRejection::NonceMismatch)));
		assert_eq!(err.status_code(), 400);
		assert!(store.sessions().is_empty());
	}

	#[tokio::test]
	async fn unsigned_tokens_without_the_flag_return_not_implemented() {
		let (engine, store, sink) = build_test_engine(false);
		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[INSTRUCTOR_ROLE], "LtiResourceLinkRequest");
		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state) },
				NOW,
			)
			.await
			.expect_err("Unverified token must be refused.");

		assert_eq!(err.status_code(), 501);
		assert!(err.to_string().contains("requires signature verification"));
		assert_eq!(store.profile_count(), 0);
		assert_eq!(sink.captured()[0].code, "signature_verification_required");
	}

	#[tokio::test]
	async fn learner_deep_link_is_forbidden_without_listing_templates() {
		let (engine, store, _) = build_test_engine(true);
		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[LEARNER_ROLE], "LtiDeepLinkingRequest");
		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state) },
				NOW,
			)
			.await
			.expect_err("Learners cannot deep link.");

		assert_eq!(err.status_code(), 403);
		assert_eq!(store.badge_template_list_calls(), 0);
		assert!(store.sessions().is_empty());
	}

	#[tokio::test]
	async fn instructor_deep_link_renders_template_forms() {
		let (engine, store, _) = build_test_engine(true);

		store.insert_badge_template(test_badge_template("tpl-1", false));
		store.insert_badge_template(test_badge_template("tpl-2", false));

		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[INSTRUCTOR_ROLE], "LtiDeepLinkingRequest");
		let response = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state) },
				NOW,
			)
			.await
			.expect("Deep link launch should succeed.");
		let LaunchOutcome::DeepLinking { return_url, options } = &response.outcome else {
			panic!("Expected a deep-linking outcome.");
		};

		assert_eq!(return_url.as_str(), TEST_DEEP_LINK_RETURN_URL);
		assert_eq!(options.len(), 2);
		assert_eq!(response.html.matches("<form").count(), 2);
		assert_eq!(store.sessions().len(), 1);
	}

	#[tokio::test]
	async fn link_conflicts_are_reported_with_claim_context() {
		let (engine, store, sink) = build_test_engine(true);
		let tenant = test_tenant();

		store
			.resolve_learner_profile_for_identity(
				&tenant,
				IdentityType::Email,
				"ada@example.edu",
				None,
			)
			.await
			.expect("Competing profile should be created.");

		let redirect = login(&engine).await;
		let mut claims =
			test_launch_claims_for(&redirect, NOW, &[LEARNER_ROLE], "LtiResourceLinkRequest");

		claims["email"] = "Ada@example.edu".into();

		let err = engine
			.complete_launch_at(
				LaunchForm {
					id_token: Some(test_unsigned_id_token(&claims)),
					state: Some(redirect.state),
				},
				NOW,
			)
			.await
			.expect_err("Email owned by another profile must abort the launch.");

		assert!(matches!(err, Error::LinkConflict { .. }));
		assert_eq!(err.status_code(), 500);
		assert!(store.sessions().is_empty());

		let captured = sink.captured();

		assert_eq!(captured.len(), 1);
		assert_eq!(captured[0].code, "identity_link_conflict");
		assert_eq!(captured[0].report.tags["subject"], TEST_SUBJECT);
		assert_eq!(captured[0].report.tags["deployment_id"], TEST_DEPLOYMENT_ID);
		assert_eq!(captured[0].report.tags["message_type"], "LtiResourceLinkRequest");
	}

	#[tokio::test]
	async fn store_failures_after_validation_are_reported() {
		let (engine, store, sink) = build_test_engine(true);
		let redirect = login(&engine).await;
		let token = test_id_token_for(&redirect, NOW, &[LEARNER_ROLE], "LtiResourceLinkRequest");

		store.set_failure(Some(StoreError::Backend { message: "write failed".into() }));

		let err = engine
			.complete_launch_at(
				LaunchForm { id_token: Some(token), state: Some(redirect.state) },
				NOW,
			)
			.await
			.expect_err("Store failure must abort the launch.");

		assert!(matches!(err, Error::Storage(_)));
		assert_eq!(sink.captured()[0].code, "storage_error");
	}
}
