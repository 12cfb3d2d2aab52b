//! Persistence contract consumed by the launch engine plus the built-in in-memory backend.
//!
//! The engine never holds a transaction across a launch. Each call is expected to be
//! idempotent except [`LaunchStore::create_session`], which always inserts a new row.

pub mod memory;
pub mod record;

pub use memory::MemoryStore;
pub use record::*;

// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserId},
	registry::IssuerRegistryEntry,
};

/// Boxed future returned by [`LaunchStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for tenants, learner identities, memberships, and sessions.
pub trait LaunchStore
where
	Self: Send + Sync,
{
	/// Returns the profile owning `(identity_type, identity_value)` in the tenant, creating a
	/// profile with that identity as its primary identity when none exists.
	fn resolve_learner_profile_for_identity<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		identity_type: IdentityType,
		identity_value: &'a str,
		display_name: Option<&'a str>,
	) -> StoreFuture<'a, ResolvedProfile>;

	/// Looks up the profile owning `(identity_type, identity_value)` in the tenant.
	fn find_learner_profile_by_identity<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		identity_type: IdentityType,
		identity_value: &'a str,
	) -> StoreFuture<'a, Option<LearnerProfile>>;

	/// Attaches a secondary identity to a profile.
	///
	/// Re-attaching an identity to the profile that already owns it is a no-op; attaching it
	/// to any other profile fails with [`StoreError::Conflict`].
	fn add_learner_identity_alias(
		&self,
		alias: ProfileIdentity,
	) -> StoreFuture<'_, ProfileIdentity>;

	/// Returns the user with `email`, creating it when absent.
	fn upsert_user_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, User>;

	/// Returns the membership of `user_id` in the tenant, creating it with `default_role`
	/// when absent. Existing roles are left untouched.
	fn ensure_tenant_membership<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		user_id: &'a UserId,
		default_role: MembershipRole,
	) -> StoreFuture<'a, TenantMembership>;

	/// Sets the membership role of `user_id` in the tenant.
	fn upsert_tenant_membership_role<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		user_id: &'a UserId,
		role: MembershipRole,
	) -> StoreFuture<'a, TenantMembership>;

	/// Persists a new session row.
	fn create_session(&self, session: NewSession) -> StoreFuture<'_, SessionRecord>;

	/// Lists every persisted issuer registration.
	fn list_lti_issuer_registrations(&self) -> StoreFuture<'_, Vec<IssuerRegistryEntry>>;

	/// Lists the tenant's badge templates, archived ones included.
	fn list_badge_templates<'a>(&'a self, tenant_id: &'a TenantId)
	-> StoreFuture<'a, Vec<BadgeTemplate>>;
}

/// Error type produced by [`LaunchStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Row (de)serialization failed in the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A uniqueness constraint rejected the write.
	#[error("Conflict: {message}.")]
	Conflict {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_errors_serialize_with_their_variant() {
		let payload = serde_json::to_string(&StoreError::Conflict { message: "alias".into() })
			.expect("StoreError should serialize to JSON.");

		assert_eq!(payload, "{\"Conflict\":{\"message\":\"alias\"}}");

		let round_trip: StoreError =
			serde_json::from_str(&payload).expect("Serialized error should deserialize from JSON.");

		assert_eq!(round_trip, StoreError::Conflict { message: "alias".into() });
	}

	#[test]
	fn membership_roles_use_snake_case_labels() {
		assert_eq!(
			serde_json::to_string(&MembershipRole::Issuer).expect("Role should serialize."),
			"\"issuer\""
		);
		assert_eq!(MembershipRole::Owner.as_str(), "owner");
		assert_eq!(IdentityType::SamlSubject.as_str(), "saml_subject");
		assert_eq!(IdentityType::SourcedId.as_str(), "sourced_id");
	}
}
