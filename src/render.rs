//! HTML for the two successful launch outcomes.

// crates.io
use askama::Template;
// self
use crate::{_prelude::*, claims::LtiRole, flows::DeepLinkOption};

const RESOURCE_LINK_TITLE: &str = "LTI 1.3 launch complete";
const DEEP_LINK_TITLE: &str = "Select a badge template";

/// Data shown on the resource-link completion page.
#[derive(Clone, Debug)]
pub struct ResourceLinkView<'a> {
	/// Tenant the user was federated into.
	pub tenant_id: &'a str,
	/// Launched placement.
	pub resource_link_id: &'a str,
	/// Classified role.
	pub role: LtiRole,
	/// Display name, when the platform shared one.
	pub display_name: Option<&'a str>,
	/// Course title, when the platform shared one.
	pub context_title: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "resource_link.html")]
struct ResourceLinkTemplate<'a> {
	title: &'a str,
	tenant_id: &'a str,
	resource_link_id: &'a str,
	role: &'a str,
	display_name: Option<&'a str>,
	context_title: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "deep_link.html")]
struct DeepLinkTemplate<'a> {
	title: &'a str,
	return_url: &'a str,
	forms: Vec<DeepLinkForm<'a>>,
}

struct DeepLinkForm<'a> {
	jwt: &'a str,
	title: &'a str,
	description: Option<&'a str>,
}

/// Renders the page returned after a resource-link launch.
pub fn resource_link_page(view: &ResourceLinkView<'_>) -> Result<String> {
	let html = ResourceLinkTemplate {
		title: RESOURCE_LINK_TITLE,
		tenant_id: view.tenant_id,
		resource_link_id: view.resource_link_id,
		role: view.role.as_str(),
		display_name: view.display_name,
		context_title: view.context_title,
	}
	.render()?;

	Ok(html)
}

/// Renders the deep-linking selection page: one form per option posting to `return_url`.
pub fn deep_link_page(return_url: &Url, options: &[DeepLinkOption]) -> Result<String> {
	let forms = options
		.iter()
		.map(|option| DeepLinkForm {
			jwt: &option.jwt,
			title: &option.title,
			description: option.description.as_deref(),
		})
		.collect();
	let html = DeepLinkTemplate { title: DEEP_LINK_TITLE, return_url: return_url.as_str(), forms }
		.render()?;

	Ok(html)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::BadgeTemplateId;

	#[test]
	fn resource_link_page_escapes_platform_values() {
		let html = resource_link_page(&ResourceLinkView {
			tenant_id: "tenant-123",
			resource_link_id: "<script>",
			role: LtiRole::Instructor,
			display_name: Some("Ada & Grace"),
			context_title: None,
		})
		.expect("Completion page should render.");

		assert!(html.contains("LTI 1.3 launch complete"));
		assert!(html.contains("&lt;script&gt;"));
		assert!(html.contains("Ada &amp; Grace"));
		assert!(html.contains("instructor"));
		assert!(!html.contains("<script>"));
		assert!(!html.contains("Course"));
	}

	#[test]
	fn deep_link_page_renders_one_form_per_option() {
		let return_url = Url::parse("https://canvas.example.edu/deep_link?x=1&y=2")
			.expect("Return URL fixture should parse.");
		let option = |id: &str| DeepLinkOption {
			template_id: BadgeTemplateId::new(id).expect("Template fixture should be valid."),
			title: format!("Badge <{id}>"),
			description: (id == "a").then(|| "First badge".to_owned()),
			launch_url: format!("https://tool.example.edu/v1/lti/launch?badgeTemplateId={id}"),
			jwt: format!("header.{id}."),
		};
		let html = deep_link_page(&return_url, &[option("a"), option("b")])
			.expect("Picker should render.");

		assert_eq!(html.matches("<form").count(), 2);
		assert_eq!(html.matches("<p>").count(), 1);
		assert!(html.contains("deep_link?x=1&amp;y=2"));
		assert!(html.contains("value=\"header.a.\""));
		assert!(html.contains("Badge &lt;b&gt;"));

		let empty = deep_link_page(&return_url, &[]).expect("Empty picker should render.");

		assert!(empty.contains("No active badge templates"));
		assert!(!empty.contains("<form"));
	}
}
