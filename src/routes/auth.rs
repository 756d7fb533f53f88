/// Account and Session Routes
///
/// Registration, login, token refresh, logout, password change and the
/// current-user profile.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{
    extract_refresh_token, removal_cookie, token_cookie, Principal, Registration, SessionManager,
    TokenPair, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::store::UserRecord;

/// User registration request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub user_name: String,
    pub email: String,
    pub password: String,
}

/// User login request; either `userName` or `email` identifies the account
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Token refresh request; the `refreshToken` cookie takes precedence
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Public view of a user; never includes credential or token material
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub created_at: String,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            user_name: user.username,
            email: user.email,
            full_name: user.full_name,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Access and refresh token, also set as cookies
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn new(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn with_session_cookies(
    mut builder: actix_web::HttpResponseBuilder,
    pair: &TokenPair,
    sessions: &SessionManager,
) -> actix_web::HttpResponseBuilder {
    builder
        .cookie(token_cookie(
            ACCESS_TOKEN_COOKIE,
            pair.access_token.clone(),
            sessions.access_token_ttl(),
        ))
        .cookie(token_cookie(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token.clone(),
            sessions.refresh_token_ttl(),
        ));
    builder
}

fn without_session_cookies(mut builder: actix_web::HttpResponseBuilder) -> actix_web::HttpResponseBuilder {
    builder
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE));
    builder
}

/// POST /api/v1/users/register
///
/// # Errors
/// - 400: Validation errors (empty fields, bad email/username, weak password)
/// - 409: Username or email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let form = form.into_inner();

    let user = sessions
        .register(Registration {
            full_name: form.full_name,
            username: form.user_name,
            email: form.email,
            password: form.password,
        })
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /api/v1/users/login
///
/// # Errors
/// - 400: Neither userName nor email given
/// - 401: Unknown user or wrong password (same response for both)
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let identifier = form
        .user_name
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .or(form.email.as_deref())
        .ok_or_else(|| ValidationError::EmptyField("username or email".to_string()))?;

    let (user, pair) = sessions.login(identifier, &form.password).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User logged in successfully"
    );

    let body = LoginResponse {
        user: UserResponse::from(user),
        tokens: TokenResponse::new(pair.clone(), sessions.access_token_ttl()),
    };

    Ok(with_session_cookies(HttpResponse::Ok(), &pair, &sessions).json(body))
}

/// POST /api/v1/users/refresh-token
///
/// Rotates the refresh token: the presented token stops working as soon as
/// this call succeeds.
///
/// # Errors
/// - 401: Missing, invalid, expired, revoked or reused refresh token
pub async fn refresh(
    req: HttpRequest,
    form: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let body_token = form.as_ref().and_then(|f| f.refresh_token.as_deref());
    let presented = extract_refresh_token(&req, body_token);

    let pair = sessions.refresh(presented.as_deref()).await?;

    tracing::info!(request_id = %context.request_id, "Token refreshed successfully");

    let body = TokenResponse::new(pair.clone(), sessions.access_token_ttl());
    Ok(with_session_cookies(HttpResponse::Ok(), &pair, &sessions).json(body))
}

/// POST /api/v1/users/logout
///
/// **Requires valid access token.**
pub async fn logout(
    principal: web::ReqData<Principal>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout").with_user_id(principal.user_id.to_string());

    sessions.logout(principal.user_id).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = ?context.user_id,
        "User logged out"
    );

    Ok(without_session_cookies(HttpResponse::Ok()).json(MessageResponse {
        message: "User logged out".to_string(),
    }))
}

/// POST /api/v1/users/change-password
///
/// **Requires valid access token.** Ends the current session; the client
/// logs in again with the new password.
///
/// # Errors
/// - 400: New password fails the strength policy
/// - 401: Old password is wrong
pub async fn change_password(
    principal: web::ReqData<Principal>,
    form: web::Json<ChangePasswordRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_change").with_user_id(principal.user_id.to_string());

    sessions
        .change_password(principal.user_id, &form.old_password, &form.new_password)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = ?context.user_id,
        "Password changed, session revoked"
    );

    Ok(without_session_cookies(HttpResponse::Ok()).json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

/// GET /api/v1/users/current-user
///
/// **Requires valid access token.**
pub async fn get_current_user(
    principal: web::ReqData<Principal>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.current_user(&principal).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
