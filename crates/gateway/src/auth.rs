use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use session::verify_token;
use shared::domain::Role;
use tracing::debug;

use crate::AppState;

/// First value of the named cookie across every `Cookie` header. Headers that
/// are not valid UTF-8 are skipped, which fails closed at the caller.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header_value in headers.get_all(header::COOKIE) {
        let Ok(raw) = header_value.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Gate applied to every route under the dashboard prefix: the session cookie
/// must be present, verify against the shared secret, and carry the admin
/// role. Anything else is sent back to the login page.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = cookie_value(request.headers(), &state.auth.cookie_name) else {
        return login_redirect();
    };

    match verify_token(&state.auth.secret, &token, Utc::now()) {
        Ok(claims) if claims.role == Role::Admin => next.run(request).await,
        Ok(claims) => {
            debug!(sub = %claims.sub, role = ?claims.role, "session lacks dashboard access");
            login_redirect()
        }
        Err(err) => {
            debug!(%err, "session token rejected");
            login_redirect()
        }
    }
}

fn login_redirect() -> Response {
    Redirect::to("/login").into_response()
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
