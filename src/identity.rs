//! Identity federation: learner profile, secondary aliases, local user, and tenant membership.
//!
//! Every step is idempotent, so a launch replayed by the platform converges on the same rows.
//! Alias linking yields an [`AliasLink`] instead of failing deep inside the store call chain;
//! [`link_identity`] turns the first [`AliasLink::Conflict`] into [`Error::LinkConflict`].

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::TenantId,
	claims::{LtiLaunchClaims, LtiRole},
	store::{
		IdentityType, LaunchStore, LearnerProfile, MembershipRole, ProfileIdentity, StoreError,
		TenantMembership, User,
	},
};

/// Domain used for synthesized placeholder addresses; `.invalid` never resolves.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "lti.invalid";

/// Outcome of linking one secondary identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AliasLink {
	/// The alias was attached by this launch.
	Created,
	/// The alias already pointed at the same profile.
	Reused,
	/// The alias belongs to a different profile.
	Conflict {
		/// Human-readable reason string.
		reason: String,
	},
}
impl AliasLink {
	/// Converts a conflict into [`Error::LinkConflict`].
	pub fn into_result(self) -> Result<Self> {
		match self {
			AliasLink::Conflict { reason } => Err(Error::LinkConflict { reason }),
			link => Ok(link),
		}
	}
}

/// Everything identity linking resolved for one launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedIdentity {
	/// `"{issuer}::{sub}"`.
	pub federated_subject: String,
	/// Learner profile owning the federated subject.
	pub profile: LearnerProfile,
	/// `true` when this launch created the profile.
	pub profile_created: bool,
	/// Outcome of the email alias, when the claims carried an email.
	pub email_link: Option<AliasLink>,
	/// Outcome of the sourced-id alias, when the claims carried one.
	pub sourced_id_link: Option<AliasLink>,
	/// Local user.
	pub user: User,
	/// `true` when the user was keyed by a synthesized placeholder address.
	pub placeholder_email: bool,
	/// Tenant membership after reconciliation.
	pub membership: TenantMembership,
}

/// Joins issuer and subject into the stable federation key.
pub fn federated_subject(issuer: &str, sub: &str) -> String {
	format!("{issuer}::{sub}")
}

/// Deterministic placeholder address for subjects without an email claim.
pub fn placeholder_email(tenant_id: &TenantId, federated_subject: &str) -> String {
	let digest = Sha256::digest(format!("{tenant_id}:{federated_subject}").as_bytes());
	let digest = hex::encode(digest);

	format!("lti+{}@{PLACEHOLDER_EMAIL_DOMAIN}", &digest[..32])
}

/// Resolves or creates the learner profile, aliases, user, and membership for a launch.
///
/// Any alias conflict or store failure aborts the link; rows written before the failure are
/// left in place because every write is idempotent.
pub async fn link_identity(
	store: &dyn LaunchStore,
	tenant_id: &TenantId,
	issuer: &str,
	claims: &LtiLaunchClaims,
	role: LtiRole,
) -> Result<LinkedIdentity> {
	let federated_subject = federated_subject(issuer, &claims.sub);
	let display_name = claims.display_name();
	let resolved = store
		.resolve_learner_profile_for_identity(
			tenant_id,
			IdentityType::SamlSubject,
			&federated_subject,
			display_name.as_deref(),
		)
		.await?;
	let profile = resolved.profile;
	let email = claims.normalized_email();
	let email_link = match email.as_deref() {
		Some(email) =>
			Some(link_alias(store, &profile, IdentityType::Email, email).await?.into_result()?),
		None => None,
	};
	let sourced_id_link = match claims.sourced_id() {
		Some(sourced_id) => Some(
			link_alias(store, &profile, IdentityType::SourcedId, sourced_id).await?.into_result()?,
		),
		None => None,
	};
	let placeholder = email.is_none();
	let user_email = email.unwrap_or_else(|| placeholder_email(tenant_id, &federated_subject));
	let user = store.upsert_user_by_email(&user_email).await?;
	let membership = reconcile_membership(store, tenant_id, &user, role).await?;

	Ok(LinkedIdentity {
		federated_subject,
		profile,
		profile_created: resolved.created,
		email_link,
		sourced_id_link,
		user,
		placeholder_email: placeholder,
		membership,
	})
}

/// Attaches `(identity_type, value)` to `profile` unless another profile already owns it.
pub async fn link_alias(
	store: &dyn LaunchStore,
	profile: &LearnerProfile,
	identity_type: IdentityType,
	value: &str,
) -> Result<AliasLink> {
	let tenant_id = &profile.tenant_id;

	match store.find_learner_profile_by_identity(tenant_id, identity_type, value).await? {
		Some(owner) if owner.id == profile.id => return Ok(AliasLink::Reused),
		Some(owner) =>
			return Ok(AliasLink::Conflict {
				reason: format!(
					"{identity_type} identity is already linked to learner profile {}",
					owner.id
				),
			}),
		None => {},
	}

	let alias = ProfileIdentity::alias(tenant_id.clone(), profile.id.clone(), identity_type, value);

	match store.add_learner_identity_alias(alias).await {
		Ok(_) => Ok(AliasLink::Created),
		// Lost a race against a concurrent launch linking the same value elsewhere.
		Err(StoreError::Conflict { message }) => Ok(AliasLink::Conflict { reason: message }),
		Err(e) => Err(e.into()),
	}
}

/// Ensures a membership exists and promotes instructors from viewer to issuer.
///
/// Roles are never lowered, and admin or owner memberships are left alone.
pub async fn reconcile_membership(
	store: &dyn LaunchStore,
	tenant_id: &TenantId,
	user: &User,
	role: LtiRole,
) -> Result<TenantMembership> {
	let membership =
		store.ensure_tenant_membership(tenant_id, &user.id, MembershipRole::Viewer).await?;
	let entitled = role.entitled_membership();

	if membership.role == MembershipRole::Viewer && entitled > MembershipRole::Viewer {
		return Ok(store.upsert_tenant_membership_role(tenant_id, &user.id, entitled).await?);
	}

	Ok(membership)
}
