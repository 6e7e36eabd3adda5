use actix_web::{
    cookie::{time, Cookie, SameSite},
    web, HttpRequest, HttpResponse,
};
use serde::Deserialize;

use crate::{
    config::AppConfig,
    database::MongoDB,
    models::UserResponse,
    services::{
        auth_service::{self, OAUTH_STATE_COOKIE, OAUTH_STATE_TTL_MINUTES},
        user_service,
    },
    utils::error::AppError,
};

fn state_cookie(config: &AppConfig, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build(OAUTH_STATE_COOKIE, value)
        .path("/api/v1/auth")
        .http_only(true)
        .secure(config.google.redirect_uri.starts_with("https://"))
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .finish()
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    tag = "Auth",
    responses(
        (status = 200, description = "Google consent URL; the state is also set as a cookie", body = auth_service::GoogleAuthUrlResponse),
        (status = 500, description = "Google OAuth not configured")
    )
)]
pub async fn google_auth(config: web::Data<AppConfig>) -> Result<HttpResponse, AppError> {
    log::info!("🔐 GET /auth/google - Generating OAuth URL");

    let response = auth_service::generate_google_oauth_url(&config.google, &config.jwt)?;
    let cookie = state_cookie(
        &config,
        response.state.clone(),
        time::Duration::minutes(OAUTH_STATE_TTL_MINUTES),
    );
    Ok(HttpResponse::Ok().cookie(cookie).json(response))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/callback",
    tag = "Auth",
    params(
        ("code" = Option<String>, Query, description = "Authorization code from Google"),
        ("state" = Option<String>, Query, description = "State issued by /auth/google"),
        ("error" = Option<String>, Query, description = "Error reported by Google")
    ),
    responses(
        (status = 200, description = "Existing user signed in"),
        (status = 201, description = "New Google user created"),
        (status = 401, description = "Bad state, rejected code or unverified Google email"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn google_callback(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 GET /auth/callback - Processing Google OAuth");

    if let Some(error) = &query.error {
        return Err(AppError::Unauthorized(format!("Google sign-in failed: {}", error)));
    }

    let cookie = req.cookie(OAUTH_STATE_COOKIE);
    auth_service::verify_oauth_state(
        &config.jwt,
        query.state.as_deref(),
        cookie.as_ref().map(|c| c.value()),
    )?;

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("No authorization code provided".to_string()))?;

    let identity = auth_service::fetch_google_profile(&config.google, code).await?;
    let (session, created) = user_service::google_sign_in(&db, &config, identity).await?;
    log::info!("✅ Google OAuth successful for {}", session.user.email.address);

    let body = serde_json::json!({
        "status": "success",
        "token": session.token,
        "user": UserResponse::from(session.user)
    });
    // the state is single use
    let expired = state_cookie(&config, String::new(), time::Duration::ZERO);
    Ok(if created {
        HttpResponse::Created().cookie(expired).json(body)
    } else {
        HttpResponse::Ok().cookie(expired).json(body)
    })
}
