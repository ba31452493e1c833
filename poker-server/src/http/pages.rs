//! Fixed fallback views
//!
//! Page rendering lives outside this server; these are the minimal views the
//! engine itself needs to answer with.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};

const LOGIN_VIEW: &str = r#"<!doctype html>
<html>
<head><title>Sign in</title></head>
<body>
<form method="post" action="/login">
<input name="loginUser" placeholder="Email">
<input name="password" type="password" placeholder="Password">
<button type="submit">Sign in</button>
</form>
</body>
</html>
"#;

const SIGNED_IN_VIEW: &str = r#"<!doctype html>
<html>
<head><title>Signed in</title></head>
<body><p>You are signed in.</p></body>
</html>
"#;

const BAD_REQUEST_VIEW: &str = r#"<!doctype html>
<html>
<head><title>Bad request</title></head>
<body><p>The request was missing required fields.</p></body>
</html>
"#;

const UNKNOWN_ROOM_VIEW: &str = r#"<!doctype html>
<html>
<head><title>Unknown room</title></head>
<body><p>This room does not exist.</p></body>
</html>
"#;

/// Shown to callers without a valid session
pub fn login_view() -> Html<&'static str> {
    Html(LOGIN_VIEW)
}

pub async fn signed_in() -> Html<&'static str> {
    Html(SIGNED_IN_VIEW)
}

pub async fn bad_request() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, Html(BAD_REQUEST_VIEW))
}

pub async fn unknown_room() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(UNKNOWN_ROOM_VIEW))
}
