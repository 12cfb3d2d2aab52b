//! LIS role vocabulary classification.

// self
use crate::{_prelude::*, store::MembershipRole};

/// Coarse role derived from the LTI `roles` claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtiRole {
	/// Teaching or administrative role.
	Instructor,
	/// Any other course membership role.
	Learner,
	/// No recognizable role was supplied.
	Unknown,
}
impl LtiRole {
	/// Returns a stable label suitable for logs and tags.
	pub const fn as_str(self) -> &'static str {
		match self {
			LtiRole::Instructor => "instructor",
			LtiRole::Learner => "learner",
			LtiRole::Unknown => "unknown",
		}
	}

	/// Membership role a launch with this role is entitled to.
	pub const fn entitled_membership(self) -> MembershipRole {
		match self {
			LtiRole::Instructor => MembershipRole::Issuer,
			LtiRole::Learner | LtiRole::Unknown => MembershipRole::Viewer,
		}
	}
}
impl Display for LtiRole {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Role URI fragments and the role kind they imply, checked in order.
const ROLE_TABLE: &[(&str, LtiRole)] = &[
	("Instructor", LtiRole::Instructor),
	("Administrator", LtiRole::Instructor),
	("Faculty", LtiRole::Instructor),
	("Learner", LtiRole::Learner),
	("Student", LtiRole::Learner),
	("Member", LtiRole::Learner),
	("membership#", LtiRole::Learner),
];

/// Classifies a set of role URIs; any instructor-class role wins over learner roles.
pub fn classify_roles<I, S>(roles: I) -> LtiRole
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut resolved = LtiRole::Unknown;

	for role in roles {
		match classify_role(role.as_ref()) {
			LtiRole::Instructor => return LtiRole::Instructor,
			LtiRole::Learner => resolved = LtiRole::Learner,
			LtiRole::Unknown => {},
		}
	}

	resolved
}

fn classify_role(role: &str) -> LtiRole {
	ROLE_TABLE
		.iter()
		.find(|(fragment, _)| role.contains(fragment))
		.map(|(_, kind)| *kind)
		.unwrap_or(LtiRole::Unknown)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn instructor_class_roles_win() {
		for role in [
			"http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor",
			"http://purl.imsglobal.org/vocab/lis/v2/institution/person#Administrator",
			"http://purl.imsglobal.org/vocab/lis/v2/institution/person#Faculty",
			"http://purl.imsglobal.org/vocab/lis/v2/membership/Instructor#TeachingAssistant",
			"Instructor",
		] {
			assert_eq!(
				classify_roles([role, "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner"]),
				LtiRole::Instructor,
				"{role} should classify as instructor."
			);
		}
	}

	#[test]
	fn membership_roles_classify_as_learner() {
		for role in [
			"http://purl.imsglobal.org/vocab/lis/v2/membership#Learner",
			"http://purl.imsglobal.org/vocab/lis/v2/institution/person#Student",
			"http://purl.imsglobal.org/vocab/lis/v2/membership#Member",
			"http://purl.imsglobal.org/vocab/lis/v2/membership#ContentDeveloper",
			"Learner",
		] {
			assert_eq!(classify_roles([role]), LtiRole::Learner, "{role} should be a learner.");
		}
	}

	#[test]
	fn unrecognized_or_missing_roles_are_unknown() {
		assert_eq!(classify_roles(Vec::<String>::new()), LtiRole::Unknown);
		assert_eq!(
			classify_roles(["http://purl.imsglobal.org/vocab/lis/v2/system/person#User"]),
			LtiRole::Unknown
		);
	}

	#[test]
	fn entitlements_never_exceed_issuer() {
		assert_eq!(LtiRole::Instructor.entitled_membership(), MembershipRole::Issuer);
		assert_eq!(LtiRole::Learner.entitled_membership(), MembershipRole::Viewer);
		assert_eq!(LtiRole::Unknown.entitled_membership(), MembershipRole::Viewer);
	}
}
