//! axum surface for the two protocol endpoints.
//!
//! - `GET|POST /v1/lti/oidc/login` answers `302` with the platform authorization URL.
//! - `POST /v1/lti/launch` answers `200` HTML with a session cookie.
//!
//! Failures are rendered as `{"error": code, "reason": message}` with the status from
//! [`Error::status_code`].

// crates.io
use axum::{
	Form, Json, Router,
	extract::{
		Query, State,
		rejection::{FormRejection, QueryRejection},
	},
	http::{StatusCode, header},
	response::{Html, IntoResponse, Response},
	routing::get,
};
use axum_extra::extract::{
	WithRejection,
	cookie::{Cookie, CookieJar, SameSite},
};
// self
use crate::{
	_prelude::*,
	config::{LAUNCH_PATH, LOGIN_PATH},
	flows::{LaunchEngine, LaunchForm, LoginInitiationParams, LoginRedirect},
	session::SessionCookie,
};

const NO_STORE: &str = "no-store";

/// Builds the router serving the login and launch endpoints.
pub fn router(engine: LaunchEngine) -> Router {
	Router::new()
		.route(LOGIN_PATH, get(login_query).post(login_form))
		.route(LAUNCH_PATH, axum::routing::post(launch))
		.with_state(engine)
}

async fn login_query(
	State(engine): State<LaunchEngine>,
	WithRejection(Query(params), _): WithRejection<Query<LoginInitiationParams>, Error>,
) -> Result<Response, Error> {
	Ok(redirect(engine.initiate_login(params).await?))
}

async fn login_form(
	State(engine): State<LaunchEngine>,
	WithRejection(Form(params), _): WithRejection<Form<LoginInitiationParams>, Error>,
) -> Result<Response, Error> {
	Ok(redirect(engine.initiate_login(params).await?))
}

async fn launch(
	State(engine): State<LaunchEngine>,
	jar: CookieJar,
	WithRejection(Form(form), _): WithRejection<Form<LaunchForm>, Error>,
) -> Result<(CookieJar, [(header::HeaderName, &'static str); 1], Html<String>), Error> {
	let response = engine.complete_launch(form).await?;
	let jar = jar.add(session_cookie(&response.session.cookie));

	Ok((jar, [(header::CACHE_CONTROL, NO_STORE)], Html(response.html)))
}

// `Redirect::to` answers 303; OIDC login initiation expects a plain 302.
fn redirect(redirect: LoginRedirect) -> Response {
	(
		StatusCode::FOUND,
		[(header::LOCATION, redirect.location.as_str()), (header::CACHE_CONTROL, NO_STORE)],
	)
		.into_response()
}

fn session_cookie(cookie: &SessionCookie) -> Cookie<'static> {
	Cookie::build((cookie.name.clone(), cookie.value.expose().to_owned()))
		.path("/")
		.http_only(true)
		.same_site(SameSite::Lax)
		.secure(cookie.secure)
		.max_age(cookie.max_age)
		.build()
}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
	reason: String,
}

impl From<QueryRejection> for Error {
	fn from(rejection: QueryRejection) -> Self {
		Error::invalid_request(rejection.body_text())
	}
}
impl From<FormRejection> for Error {
	fn from(rejection: FormRejection) -> Self {
		Error::invalid_request(rejection.body_text())
	}
}
impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let body = ErrorBody { error: self.code(), reason: self.to_string() };

		(status, [(header::CACHE_CONTROL, NO_STORE)], Json(body)).into_response()
	}
}
