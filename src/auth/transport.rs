/// Transport Adapter
///
/// Moves tokens between HTTP requests/responses and the session layer:
/// bearer header or `accessToken` cookie in, `refreshToken` cookie or body
/// field in, HTTP-only secure cookies out.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Access token from `Authorization: Bearer <t>`, falling back to the cookie
/// when the header is absent or carries no bearer token
pub fn access_token_from_parts(
    authorization: Option<&str>,
    cookie: Option<&str>,
) -> Option<String> {
    authorization
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| cookie.filter(|t| !t.is_empty()))
        .map(str::to_string)
}

pub fn extract_access_token(req: &HttpRequest) -> Option<String> {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .map(|h| h.to_str().unwrap_or_default());
    let cookie = req.cookie(ACCESS_TOKEN_COOKIE);

    access_token_from_parts(authorization, cookie.as_ref().map(|c| c.value()))
}

/// Refresh token from the cookie, falling back to the request body field
pub fn extract_refresh_token(req: &HttpRequest, body_field: Option<&str>) -> Option<String> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            body_field
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
}

/// Cookie carrying a token; HTTP-only and secure
pub fn token_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age_seconds))
        .finish()
}

/// Cookie that makes the client drop `name`
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .finish();
    cookie.make_removal();
    cookie
}
