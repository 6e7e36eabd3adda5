use crate::{
    config::{GoogleConfig, JwtConfig},
    models::{GoogleIdentity, User, UserRole},
    utils::error::AppError,
};
use actix_web::web;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BCRYPT_COST: u32 = 12;

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user _id (hex)
    pub role: UserRole,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owners may touch their own records; admins may touch any.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.is_admin() || self.sub == owner_id
    }
}

pub fn generate_jwt(config: &JwtConfig, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = Duration::try_hours(config.expires_in_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Internal("JWT lifetime out of range".to_string()))?;
    let claims = Claims {
        sub: user.id_hex(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn verify_token(config: &JwtConfig, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.audience.as_str()]);
    validation.set_issuer(&[config.issuer.as_str()]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Hashes on the blocking pool; bcrypt at cost 12 takes a noticeable slice of CPU.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    web::block(move || hash(password, BCRYPT_COST))
        .await?
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool, AppError> {
    web::block(move || verify(password, &password_hash))
        .await?
        .map_err(|e| AppError::Internal(format!("Password verification error: {}", e)))
}

// ==================== GOOGLE OAUTH ====================

/// Cookie holding the `state` of an OAuth flow started by this browser.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;
const OAUTH_STATE_AUDIENCE: &str = "google-oauth-state";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct GoogleAuthUrlResponse {
    pub status: String,
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthStateClaims {
    nonce: String,
    iat: usize,
    exp: usize,
    aud: String,
    iss: String,
}

fn sign_oauth_state(config: &JwtConfig, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = OAuthStateClaims {
        nonce: Uuid::new_v4().to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        aud: OAUTH_STATE_AUDIENCE.to_string(),
        iss: config.issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign OAuth state: {}", e)))
}

/// The callback `state` must be one we signed, still fresh, and equal to the
/// cookie set when the flow started.
pub fn verify_oauth_state(config: &JwtConfig, state: Option<&str>, cookie: Option<&str>) -> Result<(), AppError> {
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing OAuth state".to_string()))?;
    let cookie = cookie.ok_or_else(|| AppError::Unauthorized("Missing OAuth state cookie".to_string()))?;
    if state != cookie {
        return Err(AppError::Unauthorized("OAuth state mismatch".to_string()));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[OAUTH_STATE_AUDIENCE]);
    validation.set_issuer(&[config.issuer.as_str()]);

    decode::<OAuthStateClaims>(state, &DecodingKey::from_secret(config.secret.as_ref()), &validation)
        .map(|_| ())
        .map_err(|e| AppError::Unauthorized(format!("Invalid or expired OAuth state: {}", e)))
}

pub fn generate_google_oauth_url(
    google: &GoogleConfig,
    jwt: &JwtConfig,
) -> Result<GoogleAuthUrlResponse, AppError> {
    let client_id = google
        .client_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("GOOGLE_CLIENT_ID not configured".to_string()))?;

    let state = sign_oauth_state(jwt, Duration::minutes(OAUTH_STATE_TTL_MINUTES))?;

    let params = [
        ("client_id", client_id),
        ("redirect_uri", google.redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", "openid email profile"),
        ("state", state.as_str()),
        ("prompt", "select_account"),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Ok(GoogleAuthUrlResponse {
        status: "success".to_string(),
        auth_url: format!("https://accounts.google.com/o/oauth2/v2/auth?{}", query_string),
        state,
    })
}

/// Splits a display name when Google does not provide given/family names.
fn split_names(
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
    email: &str,
) -> (String, String) {
    let display = name.unwrap_or_default();
    let display = display.trim();
    let (display_first, display_last) = display.split_once(' ').unwrap_or((display, ""));
    let first = given_name
        .or_else(|| Some(display_first.to_string()))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let last = family_name
        .or_else(|| Some(display_last.trim().to_string()))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "-".to_string());
    (first, last)
}

/// Profile from the userinfo endpoint (authorization-code flow).
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<GoogleProfile> for GoogleIdentity {
    fn from(p: GoogleProfile) -> Self {
        let (first_name, last_name) = split_names(p.given_name, p.family_name, p.name, &p.email);
        GoogleIdentity {
            google_id: p.id,
            email: p.email.trim().to_lowercase(),
            email_verified: p.verified_email,
            first_name,
            last_name,
        }
    }
}

/// Claims Google reports for an ID token (`tokeninfo` endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokenInfo {
    pub aud: String,
    pub sub: String,
    #[serde(default)]
    pub email: String,
    /// `"true"`/`"false"` from tokeninfo, a boolean in decoded tokens.
    #[serde(default)]
    pub email_verified: serde_json::Value,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GoogleTokenInfo {
    /// Rejects tokens minted for another client.
    pub fn into_identity(self, client_id: &str) -> Result<GoogleIdentity, AppError> {
        if self.aud != client_id {
            return Err(AppError::Unauthorized("Google credential was issued for another client".to_string()));
        }
        let email_verified = self.email_verified == serde_json::Value::Bool(true) || self.email_verified == "true";
        let (first_name, last_name) = split_names(self.given_name, self.family_name, self.name, &self.email);
        Ok(GoogleIdentity {
            google_id: self.sub,
            email: self.email.trim().to_lowercase(),
            email_verified,
            first_name,
            last_name,
        })
    }
}

/// Checks a client-obtained Google ID token with Google and returns its identity.
pub async fn verify_google_id_token(config: &GoogleConfig, credential: &str) -> Result<GoogleIdentity, AppError> {
    let client_id = config
        .client_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("GOOGLE_CLIENT_ID not configured".to_string()))?;

    let response = reqwest::Client::new()
        .get("https://oauth2.googleapis.com/tokeninfo")
        .query(&[("id_token", credential)])
        .send()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to reach Google: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::Unauthorized("Invalid Google credential".to_string()));
    }

    response
        .json::<GoogleTokenInfo>()
        .await
        .map_err(|e| AppError::Unauthorized(format!("Unreadable Google credential: {}", e)))?
        .into_identity(client_id)
}

/// Exchanges an authorization code for the signed-in Google profile.
pub async fn fetch_google_profile(config: &GoogleConfig, code: &str) -> Result<GoogleIdentity, AppError> {
    let client_id = config
        .client_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("GOOGLE_CLIENT_ID not configured".to_string()))?;
    let client_secret = config
        .client_secret
        .as_deref()
        .ok_or_else(|| AppError::Internal("GOOGLE_CLIENT_SECRET not configured".to_string()))?;

    let client = reqwest::Client::new();
    let token_response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to exchange code: {}", e)))?;

    if !token_response.status().is_success() {
        return Err(AppError::Unauthorized("Failed to exchange authorization code".to_string()));
    }

    let tokens: serde_json::Value = token_response
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to parse token response: {}", e)))?;

    let access_token = tokens["access_token"]
        .as_str()
        .ok_or_else(|| AppError::Unauthorized("No access token in response".to_string()))?;

    let profile = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to get user info: {}", e)))?
        .json::<GoogleProfile>()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to parse user info: {}", e)))?;

    Ok(profile.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::{CreateUserRequest, User};
    use mongodb::bson::oid::ObjectId;

    fn user_with_role(role: UserRole) -> User {
        let mut user = User::new_local(
            &CreateUserRequest {
                first_name: Some("Tsion".into()),
                last_name: Some("Ephrem".into()),
                email: Some("tsion@example.org".into()),
                password: Some("secret1".into()),
                ..Default::default()
            },
            "hash".into(),
        );
        user.id = Some(ObjectId::new());
        user.role = role;
        user
    }

    #[test]
    fn jwt_round_trip_keeps_subject_and_role() {
        let config = AppConfig::for_tests().jwt;
        let user = user_with_role(UserRole::Admin);

        let token = generate_jwt(&config, &user).unwrap();
        let claims = verify_token(&config, &token).unwrap();

        assert_eq!(claims.sub, user.id_hex());
        assert!(claims.is_admin());
        assert_eq!(claims.iss, "referral-service");
    }

    #[test]
    fn jwt_signed_with_other_secret_is_rejected() {
        let config = AppConfig::for_tests().jwt;
        let mut other = config.clone();
        other.secret = "another-secret".into();

        let token = generate_jwt(&other, &user_with_role(UserRole::User)).unwrap();
        assert!(matches!(verify_token(&config, &token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_jwt_is_rejected() {
        let mut config = AppConfig::for_tests().jwt;
        config.expires_in_hours = -2;
        let token = generate_jwt(&config, &user_with_role(UserRole::User)).unwrap();
        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn owners_and_admins_can_manage() {
        let config = AppConfig::for_tests().jwt;
        let user = user_with_role(UserRole::User);
        let claims = verify_token(&config, &generate_jwt(&config, &user).unwrap()).unwrap();

        assert!(claims.can_manage(&user.id_hex()));
        assert!(!claims.can_manage(&ObjectId::new().to_hex()));

        let admin = user_with_role(UserRole::Admin);
        let admin_claims = verify_token(&config, &generate_jwt(&config, &admin).unwrap()).unwrap();
        assert!(admin_claims.can_manage(&ObjectId::new().to_hex()));
    }

    #[actix_web::test]
    async fn password_hash_verifies() {
        let hashed = hash_password("secret1".into()).await.unwrap();
        assert_ne!(hashed, "secret1");
        assert!(verify_password("secret1".into(), hashed.clone()).await.unwrap());
        assert!(!verify_password("wrong-pass".into(), hashed).await.unwrap());
    }

    #[test]
    fn huge_jwt_lifetime_is_an_error_not_a_panic() {
        let mut config = AppConfig::for_tests().jwt;
        config.expires_in_hours = i64::MAX;
        assert!(matches!(
            generate_jwt(&config, &user_with_role(UserRole::User)),
            Err(AppError::Internal(_))
        ));
    }

    fn google_config() -> GoogleConfig {
        GoogleConfig {
            client_id: Some("client-123".into()),
            client_secret: None,
            redirect_uri: "http://localhost:3000/auth/callback".into(),
        }
    }

    #[test]
    fn google_url_carries_client_and_state() {
        let jwt = AppConfig::for_tests().jwt;
        let response = generate_google_oauth_url(&google_config(), &jwt).unwrap();
        assert!(response.auth_url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(response.auth_url.contains("client_id=client-123"));
        assert!(response
            .auth_url
            .contains(&format!("state={}", urlencoding::encode(&response.state))));
        assert!(response
            .auth_url
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
    }

    #[test]
    fn google_url_needs_client_id() {
        let jwt = AppConfig::for_tests().jwt;
        assert!(generate_google_oauth_url(&GoogleConfig::default(), &jwt).is_err());
    }

    #[test]
    fn oauth_state_must_match_cookie_and_signature() {
        let jwt = AppConfig::for_tests().jwt;
        let state = generate_google_oauth_url(&google_config(), &jwt).unwrap().state;

        assert!(verify_oauth_state(&jwt, Some(&state), Some(&state)).is_ok());
        assert!(verify_oauth_state(&jwt, None, Some(&state)).is_err());
        assert!(verify_oauth_state(&jwt, Some(&state), None).is_err());

        let other = sign_oauth_state(&jwt, Duration::minutes(5)).unwrap();
        assert!(verify_oauth_state(&jwt, Some(&state), Some(&other)).is_err());

        // matching but forged
        assert!(verify_oauth_state(&jwt, Some("attacker"), Some("attacker")).is_err());
    }

    #[test]
    fn expired_oauth_state_is_rejected() {
        let jwt = AppConfig::for_tests().jwt;
        let stale = sign_oauth_state(&jwt, Duration::minutes(-5)).unwrap();
        assert!(matches!(
            verify_oauth_state(&jwt, Some(&stale), Some(&stale)),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn oauth_state_is_not_a_session_token() {
        let jwt = AppConfig::for_tests().jwt;
        let state = sign_oauth_state(&jwt, Duration::minutes(5)).unwrap();
        assert!(verify_token(&jwt, &state).is_err());
    }

    #[test]
    fn token_info_must_target_our_client() {
        let info: GoogleTokenInfo = serde_json::from_value(serde_json::json!({
            "aud": "client-123",
            "sub": "1098",
            "email": "Abebe@Example.org",
            "email_verified": "true",
            "given_name": "Abebe",
            "family_name": "Kebede"
        }))
        .unwrap();

        let identity = info.clone().into_identity("client-123").unwrap();
        assert_eq!(identity.google_id, "1098");
        assert_eq!(identity.email, "abebe@example.org");
        assert!(identity.email_verified);

        assert!(matches!(info.into_identity("someone-else"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn token_info_reports_unverified_email() {
        let info: GoogleTokenInfo = serde_json::from_value(serde_json::json!({
            "aud": "client-123",
            "sub": "1098",
            "email": "abebe@example.org",
            "email_verified": "false"
        }))
        .unwrap();
        let identity = info.into_identity("client-123").unwrap();
        assert!(!identity.email_verified);
        assert!(identity.ensure_verified().is_err());
    }

    #[test]
    fn userinfo_profile_name_fallbacks() {
        let split = GoogleProfile {
            id: "1".into(),
            email: "hana@example.org".into(),
            verified_email: true,
            given_name: Some("Hana".into()),
            family_name: Some("Girma".into()),
            name: None,
        };
        let identity = GoogleIdentity::from(split.clone());
        assert_eq!((identity.first_name.as_str(), identity.last_name.as_str()), ("Hana", "Girma"));
        assert!(identity.email_verified);

        let display_only = GoogleProfile {
            given_name: None,
            family_name: None,
            name: Some("Selam Tesfaye".into()),
            ..split.clone()
        };
        let identity = GoogleIdentity::from(display_only);
        assert_eq!((identity.first_name.as_str(), identity.last_name.as_str()), ("Selam", "Tesfaye"));

        let nothing = GoogleProfile {
            given_name: None,
            family_name: None,
            name: None,
            verified_email: false,
            ..split
        };
        let identity = GoogleIdentity::from(nothing);
        assert_eq!((identity.first_name.as_str(), identity.last_name.as_str()), ("hana", "-"));
        assert!(identity.ensure_verified().is_err());
    }
}
