use base64::Engine;
use mongodb::bson::{doc, DateTime};
use mongodb::options::ReturnDocument;
use rand::RngCore;

use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{normalize_email, User, USERS_COLLECTION},
    services::email_service::{verification_email, EmailSender},
    utils::error::AppError,
};

const TOKEN_BYTES: usize = 32;
const MILLIS_PER_HOUR: i64 = 3_600_000;

/// 32 random bytes, URL-safe base64 without padding (43 characters).
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_expiry(ttl_hours: i64) -> DateTime {
    let ttl_millis = ttl_hours.saturating_mul(MILLIS_PER_HOUR);
    DateTime::from_millis(DateTime::now().timestamp_millis().saturating_add(ttl_millis))
}

/// Sends the verification link. Failures are logged, never returned: the
/// account exists either way and the user can ask for a new link.
pub async fn send_verification_email(
    config: &AppConfig,
    mailer: &dyn EmailSender,
    user: &User,
    token: &str,
) {
    let link = config.verification_link(token);
    let email = verification_email(
        &user.email.address,
        &user.first_name,
        &link,
        config.verification_token_ttl_hours,
    );

    if let Err(e) = mailer.send(email).await {
        log::error!("❌ Error sending verification email to {}: {}", user.email.address, e);
    }
}

/// Issues a fresh token for an unverified account and emails it.
pub async fn request_email_verification(
    db: &MongoDB,
    config: &AppConfig,
    mailer: &dyn EmailSender,
    email: &str,
) -> Result<(), AppError> {
    let email = normalize_email(&Some(email.to_string()))
        .ok_or_else(|| AppError::validation("email", "Email is required"))?;

    let collection = db.collection::<User>(USERS_COLLECTION);
    let user = collection
        .find_one(doc! { "email.address": &email })
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with that email address".to_string()))?;

    if user.email.verified {
        return Err(AppError::BadRequest("Email is already verified".to_string()));
    }

    let user_id = user
        .id
        .ok_or_else(|| AppError::Internal("Stored user has no _id".to_string()))?;
    let token = generate_verification_token();

    collection
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "verificationToken": &token,
                "verificationTokenExpiresAt": token_expiry(config.verification_token_ttl_hours),
                "updatedAt": DateTime::now(),
            }},
        )
        .await?;

    log::info!("🔑 Verification token issued for {}", email);
    send_verification_email(config, mailer, &user, &token).await;
    Ok(())
}

/// Marks the email verified and clears the token, provided it has not expired.
pub async fn verify_email(db: &MongoDB, token: &str) -> Result<User, AppError> {
    let now = DateTime::now();

    db.collection::<User>(USERS_COLLECTION)
        .find_one_and_update(
            doc! {
                "verificationToken": token,
                "verificationTokenExpiresAt": { "$gt": now },
            },
            doc! {
                "$set": { "email.verified": true, "updatedAt": now },
                "$unset": { "verificationToken": "", "verificationTokenExpiresAt": "" },
            },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".to_string()))
}
