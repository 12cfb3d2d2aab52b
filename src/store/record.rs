//! Row shapes exchanged with [`LaunchStore`](super::LaunchStore) implementations.

// self
use crate::{
	_prelude::*,
	auth::{BadgeTemplateId, LearnerProfileId, SessionId, TenantId, UserId},
};

/// Kind of identity attached to a learner profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
	/// Federated subject, `"{issuer}::{sub}"`.
	SamlSubject,
	/// Email address.
	Email,
	/// LIS person sourced identifier.
	SourcedId,
}
impl IdentityType {
	/// Stable storage label.
	pub const fn as_str(self) -> &'static str {
		match self {
			IdentityType::SamlSubject => "saml_subject",
			IdentityType::Email => "email",
			IdentityType::SourcedId => "sourced_id",
		}
	}
}
impl Display for IdentityType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Learner profile keyed by `(tenant_id, subject_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
	/// Profile identifier.
	pub id: LearnerProfileId,
	/// Owning tenant.
	pub tenant_id: TenantId,
	/// Primary subject the profile was created for.
	pub subject_id: String,
	/// Optional display name captured at creation.
	pub display_name: Option<String>,
}

/// Identity row linking a value to a learner profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileIdentity {
	/// Owning tenant.
	pub tenant_id: TenantId,
	/// Profile the identity resolves to.
	pub learner_profile_id: LearnerProfileId,
	/// Identity kind.
	pub identity_type: IdentityType,
	/// Identity value, unique per `(tenant_id, identity_type)`.
	pub identity_value: String,
	/// Whether this is the profile's primary identity.
	pub is_primary: bool,
	/// Whether the value was verified by a trusted party.
	pub is_verified: bool,
}
impl ProfileIdentity {
	/// Builds a non-primary, pre-verified alias row.
	pub fn alias(
		tenant_id: TenantId,
		learner_profile_id: LearnerProfileId,
		identity_type: IdentityType,
		identity_value: impl Into<String>,
	) -> Self {
		Self {
			tenant_id,
			learner_profile_id,
			identity_type,
			identity_value: identity_value.into(),
			is_primary: false,
			is_verified: true,
		}
	}
}

/// Profile returned when [`LaunchStore`](super::LaunchStore) resolves an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProfile {
	/// Profile owning the identity.
	pub profile: LearnerProfile,
	/// `true` when the profile was created by this call.
	pub created: bool,
}

/// Local platform user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	/// User identifier.
	pub id: UserId,
	/// Lowercased email address (possibly a synthesized placeholder).
	pub email: String,
}

/// Role of a user inside a tenant, ordered by privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
	/// Read-only access.
	Viewer,
	/// May issue credentials.
	Issuer,
	/// Tenant administrator.
	Admin,
	/// Tenant owner.
	Owner,
}
impl MembershipRole {
	/// Stable storage label.
	pub const fn as_str(self) -> &'static str {
		match self {
			MembershipRole::Viewer => "viewer",
			MembershipRole::Issuer => "issuer",
			MembershipRole::Admin => "admin",
			MembershipRole::Owner => "owner",
		}
	}
}
impl Display for MembershipRole {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// `(tenant_id, user_id) -> role` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
	/// Tenant.
	pub tenant_id: TenantId,
	/// Member.
	pub user_id: UserId,
	/// Current role.
	pub role: MembershipRole,
}

/// Session row to insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSession {
	/// Tenant the session is scoped to.
	pub tenant_id: TenantId,
	/// Session owner.
	pub user_id: UserId,
	/// Hex SHA-256 of the raw session token.
	pub session_token_hash: String,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}

/// Persisted session row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	/// Session identifier.
	pub id: SessionId,
	/// Tenant the session is scoped to.
	pub tenant_id: TenantId,
	/// Session owner.
	pub user_id: UserId,
	/// Hex SHA-256 of the raw session token.
	pub session_token_hash: String,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}

/// Badge template offered through deep linking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeTemplate {
	/// Template identifier.
	pub id: BadgeTemplateId,
	/// Owning tenant.
	pub tenant_id: TenantId,
	/// URL-safe slug.
	pub slug: String,
	/// Human-readable title.
	pub title: String,
	/// Optional description.
	#[serde(default)]
	pub description: Option<String>,
	/// Archived templates are never offered.
	#[serde(default)]
	pub archived: bool,
}
