//! Thread-safe in-memory [`LaunchStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{LearnerProfileId, SessionId, TenantId, UserId},
	registry::IssuerRegistryEntry,
	store::{
		BadgeTemplate, IdentityType, LaunchStore, LearnerProfile, MembershipRole, NewSession,
		ProfileIdentity, ResolvedProfile, SessionRecord, StoreError, StoreFuture,
		TenantMembership, User,
	},
};

type StoreState = Arc<RwLock<MemoryState>>;
type IdentityKey = (TenantId, IdentityType, String);

#[derive(Debug, Default)]
struct MemoryState {
	next_id: u64,
	profiles: HashMap<LearnerProfileId, LearnerProfile>,
	identities: HashMap<IdentityKey, ProfileIdentity>,
	users: HashMap<String, User>,
	memberships: HashMap<(TenantId, UserId), MembershipRole>,
	sessions: Vec<SessionRecord>,
	registrations: Vec<IssuerRegistryEntry>,
	templates: Vec<BadgeTemplate>,
	template_list_calls: usize,
	failure: Option<StoreError>,
}
impl MemoryState {
	fn check(&self) -> Result<(), StoreError> {
		match &self.failure {
			Some(e) => Err(e.clone()),
			None => Ok(()),
		}
	}

	fn mint(&mut self, prefix: &str) -> String {
		self.next_id += 1;

		format!("{prefix}-{}", self.next_id)
	}
}

/// Storage backend that keeps every row in-process.
///
/// Identity values are unique per `(tenant, identity type)`, mirroring the unique index a SQL
/// backend would carry.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreState);
impl MemoryStore {
	/// Seeds a persisted issuer registration.
	pub fn insert_registration(&self, entry: IssuerRegistryEntry) {
		self.0.write().registrations.push(entry);
	}

	/// Seeds a badge template.
	pub fn insert_badge_template(&self, template: BadgeTemplate) {
		self.0.write().templates.push(template);
	}

	/// Seeds or overwrites a membership role.
	pub fn set_membership(&self, tenant_id: TenantId, user_id: UserId, role: MembershipRole) {
		self.0.write().memberships.insert((tenant_id, user_id), role);
	}

	/// Makes every subsequent call fail with `error` until cleared with `None`.
	pub fn set_failure(&self, error: Option<StoreError>) {
		self.0.write().failure = error;
	}

	/// Current membership role, if any.
	pub fn membership(&self, tenant_id: &TenantId, user_id: &UserId) -> Option<MembershipRole> {
		self.0.read().memberships.get(&(tenant_id.clone(), user_id.clone())).copied()
	}

	/// User registered under `email`, if any.
	pub fn user_by_email(&self, email: &str) -> Option<User> {
		self.0.read().users.get(&email.to_ascii_lowercase()).cloned()
	}

	/// Every session created so far, in creation order.
	pub fn sessions(&self) -> Vec<SessionRecord> {
		self.0.read().sessions.clone()
	}

	/// Number of learner profiles.
	pub fn profile_count(&self) -> usize {
		self.0.read().profiles.len()
	}

	/// Identities attached to `profile_id`.
	pub fn identities_of(&self, profile_id: &LearnerProfileId) -> Vec<ProfileIdentity> {
		let mut identities = self
			.0
			.read()
			.identities
			.values()
			.filter(|identity| &identity.learner_profile_id == profile_id)
			.cloned()
			.collect::<Vec<_>>();

		identities.sort_by(|a, b| {
			(a.identity_type.as_str(), &a.identity_value)
				.cmp(&(b.identity_type.as_str(), &b.identity_value))
		});

		identities
	}

	/// Number of times [`LaunchStore::list_badge_templates`] was called.
	pub fn badge_template_list_calls(&self) -> usize {
		self.0.read().template_list_calls
	}

	fn resolve_now(
		state: StoreState,
		tenant_id: TenantId,
		identity_type: IdentityType,
		identity_value: String,
		display_name: Option<String>,
	) -> Result<ResolvedProfile, StoreError> {
		let mut guard = state.write();

		guard.check()?;

		let key = (tenant_id.clone(), identity_type, identity_value.clone());

		if let Some(profile) = guard
			.identities
			.get(&key)
			.and_then(|identity| guard.profiles.get(&identity.learner_profile_id))
		{
			return Ok(ResolvedProfile { profile: profile.clone(), created: false });
		}

		let raw_id = guard.mint("profile");
		let id = LearnerProfileId::new(raw_id)
			.map_err(|e| StoreError::Backend { message: e.to_string() })?;
		let profile = LearnerProfile {
			id: id.clone(),
			tenant_id: tenant_id.clone(),
			subject_id: identity_value.clone(),
			display_name,
		};

		guard.profiles.insert(id.clone(), profile.clone());
		guard.identities.insert(key, ProfileIdentity {
			tenant_id,
			learner_profile_id: id,
			identity_type,
			identity_value,
			is_primary: true,
			is_verified: true,
		});

		Ok(ResolvedProfile { profile, created: true })
	}

	fn find_now(
		state: StoreState,
		key: IdentityKey,
	) -> Result<Option<LearnerProfile>, StoreError> {
		let guard = state.read();

		guard.check()?;

		Ok(guard
			.identities
			.get(&key)
			.and_then(|identity| guard.profiles.get(&identity.learner_profile_id))
			.cloned())
	}

	fn add_alias_now(
		state: StoreState,
		alias: ProfileIdentity,
	) -> Result<ProfileIdentity, StoreError> {
		let mut guard = state.write();

		guard.check()?;

		if !guard.profiles.contains_key(&alias.learner_profile_id) {
			return Err(StoreError::Backend {
				message: format!("learner profile {} does not exist", alias.learner_profile_id),
			});
		}

		let key = (alias.tenant_id.clone(), alias.identity_type, alias.identity_value.clone());

		match guard.identities.get(&key) {
			Some(existing) if existing.learner_profile_id == alias.learner_profile_id =>
				Ok(existing.clone()),
			Some(existing) => Err(StoreError::Conflict {
				message: format!(
					"{} identity is already linked to learner profile {}",
					alias.identity_type, existing.learner_profile_id
				),
			}),
			None => {
				guard.identities.insert(key, alias.clone());

				Ok(alias)
			},
		}
	}

	fn upsert_user_now(state: StoreState, email: String) -> Result<User, StoreError> {
		let mut guard = state.write();

		guard.check()?;

		if let Some(user) = guard.users.get(&email) {
			return Ok(user.clone());
		}

		let raw_id = guard.mint("user");
		let id = UserId::new(raw_id).map_err(|e| StoreError::Backend { message: e.to_string() })?;
		let user = User { id, email: email.clone() };

		guard.users.insert(email, user.clone());

		Ok(user)
	}

	fn membership_now(
		state: StoreState,
		tenant_id: TenantId,
		user_id: UserId,
		role: MembershipRole,
		overwrite: bool,
	) -> Result<TenantMembership, StoreError> {
		let mut guard = state.write();

		guard.check()?;

		let slot = guard.memberships.entry((tenant_id.clone(), user_id.clone())).or_insert(role);

		if overwrite {
			*slot = role;
		}

		Ok(TenantMembership { tenant_id, user_id, role: *slot })
	}

	fn create_session_now(
		state: StoreState,
		session: NewSession,
	) -> Result<SessionRecord, StoreError> {
		let mut guard = state.write();

		guard.check()?;

		let raw_id = guard.mint("session");
		let id =
			SessionId::new(raw_id).map_err(|e| StoreError::Backend { message: e.to_string() })?;
		let record = SessionRecord {
			id,
			tenant_id: session.tenant_id,
			user_id: session.user_id,
			session_token_hash: session.session_token_hash,
			created_at: session.created_at,
			expires_at: session.expires_at,
		};

		guard.sessions.push(record.clone());

		Ok(record)
	}

	fn list_templates_now(
		state: StoreState,
		tenant_id: TenantId,
	) -> Result<Vec<BadgeTemplate>, StoreError> {
		let mut guard = state.write();

		guard.template_list_calls += 1;
		guard.check()?;

		Ok(guard
			.templates
			.iter()
			.filter(|template| template.tenant_id == tenant_id)
			.cloned()
			.collect())
	}
}
impl LaunchStore for MemoryStore {
	fn resolve_learner_profile_for_identity<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		identity_type: IdentityType,
		identity_value: &'a str,
		display_name: Option<&'a str>,
	) -> StoreFuture<'a, ResolvedProfile> {
		let state = self.0.clone();
		let tenant_id = tenant_id.to_owned();
		let identity_value = identity_value.to_owned();
		let display_name = display_name.map(str::to_owned);

		Box::pin(async move {
			Self::resolve_now(state, tenant_id, identity_type, identity_value, display_name)
		})
	}

	fn find_learner_profile_by_identity<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		identity_type: IdentityType,
		identity_value: &'a str,
	) -> StoreFuture<'a, Option<LearnerProfile>> {
		let state = self.0.clone();
		let key = (tenant_id.to_owned(), identity_type, identity_value.to_owned());

		Box::pin(async move { Self::find_now(state, key) })
	}

	fn add_learner_identity_alias(
		&self,
		alias: ProfileIdentity,
	) -> StoreFuture<'_, ProfileIdentity> {
		let state = self.0.clone();

		Box::pin(async move { Self::add_alias_now(state, alias) })
	}

	fn upsert_user_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, User> {
		let state = self.0.clone();
		let email = email.trim().to_ascii_lowercase();

		Box::pin(async move { Self::upsert_user_now(state, email) })
	}

	fn ensure_tenant_membership<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		user_id: &'a UserId,
		default_role: MembershipRole,
	) -> StoreFuture<'a, TenantMembership> {
		let state = self.0.clone();
		let tenant_id = tenant_id.to_owned();
		let user_id = user_id.to_owned();

		Box::pin(async move {
			Self::membership_now(state, tenant_id, user_id, default_role, false)
		})
	}

	fn upsert_tenant_membership_role<'a>(
		&'a self,
		tenant_id: &'a TenantId,
		user_id: &'a UserId,
		role: MembershipRole,
	) -> StoreFuture<'a, TenantMembership> {
		let state = self.0.clone();
		let tenant_id = tenant_id.to_owned();
		let user_id = user_id.to_owned();

		Box::pin(async move { Self::membership_now(state, tenant_id, user_id, role, true) })
	}

	fn create_session(&self, session: NewSession) -> StoreFuture<'_, SessionRecord> {
		let state = self.0.clone();

		Box::pin(async move { Self::create_session_now(state, session) })
	}

	fn list_lti_issuer_registrations(&self) -> StoreFuture<'_, Vec<IssuerRegistryEntry>> {
		let state = self.0.clone();

		Box::pin(async move {
			let guard = state.read();

			guard.check()?;

			Ok(guard.registrations.clone())
		})
	}

	fn list_badge_templates<'a>(
		&'a self,
		tenant_id: &'a TenantId,
	) -> StoreFuture<'a, Vec<BadgeTemplate>> {
		let state = self.0.clone();
		let tenant_id = tenant_id.to_owned();

		Box::pin(async move { Self::list_templates_now(state, tenant_id) })
	}
}
