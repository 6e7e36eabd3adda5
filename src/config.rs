use std::env;

/// Runtime configuration, read once from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: String,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub verification_token_ttl_hours: i64,
    pub app_base_url: String,
    pub smtp: Option<SmtpConfig>,
    pub google: GoogleConfig,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expires_in_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Upper bound for any hour-based lifetime (one year).
pub const MAX_TTL_HOURS: i64 = 24 * 365;

/// Keeps configured lifetimes positive and small enough for date arithmetic.
fn clamp_hours(key: &str, hours: i64) -> i64 {
    let clamped = hours.clamp(1, MAX_TTL_HOURS);
    if clamped != hours {
        log::warn!("⚠️  {}={} out of range, using {}", key, hours, clamped);
    }
    clamped
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let host = var_or("HOST", "0.0.0.0");
        let port = var_or("PORT", "3002");

        // SMTP is optional: without it verification links are only logged
        let smtp = match (env::var("SMTP_HOST"), env::var("SMTP_USERNAME")) {
            (Ok(smtp_host), Ok(username)) => Some(SmtpConfig {
                host: smtp_host,
                port: parse_or("SMTP_PORT", 587),
                from: var_or("SMTP_FROM", &username),
                password: var_or("SMTP_PASSWORD", ""),
                username,
            }),
            _ => None,
        };

        let cors_allowed_origins = var_or("CORS_ALLOWED_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            app_base_url: var_or("APP_BASE_URL", &format!("http://localhost:{}", port)),
            host,
            port,
            database_url,
            jwt: JwtConfig {
                secret: var_or("JWT_SECRET", "default-secret-change-me"),
                issuer: var_or("JWT_ISSUER", "referral-service"),
                audience: var_or("JWT_AUDIENCE", "referral-api"),
                expires_in_hours: clamp_hours("JWT_EXPIRES_IN_HOURS", parse_or("JWT_EXPIRES_IN_HOURS", 24)),
            },
            verification_token_ttl_hours: clamp_hours(
                "VERIFICATION_TOKEN_TTL_HOURS",
                parse_or("VERIFICATION_TOKEN_TTL_HOURS", 24),
            ),
            smtp,
            google: GoogleConfig {
                client_id: env::var("GOOGLE_CLIENT_ID").ok(),
                client_secret: env::var("GOOGLE_CLIENT_SECRET").ok(),
                redirect_uri: var_or("GOOGLE_REDIRECT_URI", "http://localhost:3000/auth/callback"),
            },
            cors_allowed_origins,
        })
    }

    /// Public link a user follows to confirm their email address.
    pub fn verification_link(&self, token: &str) -> String {
        format!(
            "{}/api/v1/users/verifyEmail/{}",
            self.app_base_url.trim_end_matches('/'),
            urlencoding::encode(token)
        )
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: "3002".to_string(),
            database_url: "mongodb://localhost:27017/referral_service_test".to_string(),
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: "referral-service".to_string(),
                audience: "referral-api".to_string(),
                expires_in_hours: 1,
            },
            verification_token_ttl_hours: 24,
            app_base_url: "https://donate.example.org/".to_string(),
            smtp: None,
            google: GoogleConfig::default(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}
