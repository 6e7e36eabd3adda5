use futures::{stream::TryStreamExt, FutureExt};
use mongodb::bson::{doc, Bson, DateTime};
use mongodb::options::ReturnDocument;

use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{
        identity_conflict_filter, normalize_email, CreateUserRequest, GoogleIdentity,
        GoogleSignUpRequest, LoginRequest, UpdateUserRequest, User, USERS_COLLECTION,
    },
    services::{
        auth_service,
        email_service::EmailSender,
        verification_service::{generate_verification_token, send_verification_email, token_expiry},
    },
    utils::{
        error::AppError,
        validation::{non_blank, parse_object_id},
    },
};

/// A signed-in user and the JWT issued for them.
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Manual sign-up.
///
/// The uniqueness check and the insert run in one transaction through the
/// driver's retrying runner: a write conflict with a racing sign-up is
/// retried, and the retry's lookup sees the committed account. The
/// verification email goes out after commit, so a rolled-back account never
/// receives a link.
pub async fn create_user(
    db: &MongoDB,
    config: &AppConfig,
    mailer: &dyn EmailSender,
    request: CreateUserRequest,
) -> Result<Session, AppError> {
    request.validate()?;

    let email = request
        .normalized_email()
        .ok_or_else(|| AppError::validation("email", "Email is required"))?;
    let phone_number = non_blank(&request.phone_number);
    let password = request.password.clone().unwrap_or_default();

    let password_hash = auth_service::hash_password(password).await?;
    let mut user = User::new_local(&request, password_hash);
    let verification_token = generate_verification_token();
    user.verification_token = Some(verification_token.clone());
    user.verification_token_expires_at = Some(token_expiry(config.verification_token_ttl_hours));

    let collection = db.collection::<User>(USERS_COLLECTION);
    let conflict = identity_conflict_filter(&email, phone_number.as_deref());

    let mut session = db.client().start_session().await?;
    // None: the email or phone is already taken
    let inserted_id: Option<Bson> = session
        .start_transaction()
        .and_run((&collection, &conflict, &user), |session, (collection, conflict, user)| {
            async move {
                let existing = collection
                    .find_one((**conflict).clone())
                    .session(&mut *session)
                    .await?;
                if existing.is_some() {
                    return Ok(None);
                }
                let inserted = collection.insert_one(&**user).session(&mut *session).await?;
                Ok(Some(inserted.inserted_id))
            }
            .boxed()
        })
        .await?;

    let inserted_id = inserted_id
        .ok_or_else(|| AppError::Duplicate("Email or phone number already registered.".to_string()))?;
    user.id = inserted_id.as_object_id();
    log::info!("✅ User created: {} ({})", user.email.address, user.id_hex());

    let token = auth_service::generate_jwt(&config.jwt, &user)?;
    send_verification_email(config, mailer, &user, &verification_token).await;
    Ok(Session { token, user })
}

/// Finds the account for a verified Google identity by Google ID or email,
/// attaching the Google ID when missing, or creates a verified account.
/// The flag is `true` when a user was created.
async fn find_or_create_google_user(
    db: &MongoDB,
    config: &AppConfig,
    identity: GoogleIdentity,
) -> Result<(Session, bool), AppError> {
    identity.ensure_verified()?;

    let collection = db.collection::<User>(USERS_COLLECTION);
    let existing = collection
        .find_one(doc! { "$or": [ { "googleId": &identity.google_id }, { "email.address": &identity.email } ] })
        .await?;

    if let Some(mut user) = existing {
        if !user.is_active() {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }
        if user.google_id.is_none() {
            let now = DateTime::now();
            collection
                .update_one(
                    doc! { "_id": user.id },
                    doc! { "$set": { "googleId": &identity.google_id, "updatedAt": now } },
                )
                .await?;
            user.google_id = Some(identity.google_id);
            user.updated_at = now;
            log::info!("🔗 Linked Google account to existing user {}", user.id_hex());
        }

        let token = auth_service::generate_jwt(&config.jwt, &user)?;
        return Ok((Session { token, user }, false));
    }

    let mut user = User::new_google(&identity);
    let inserted = collection.insert_one(&user).await?;
    user.id = inserted.inserted_id.as_object_id();
    log::info!("✅ Google user created: {} ({})", user.email.address, user.id_hex());

    let token = auth_service::generate_jwt(&config.jwt, &user)?;
    Ok((Session { token, user }, true))
}

/// Sign-in with a Google ID token the client obtained; Google vouches for
/// the identity, the body only supplies optional names.
pub async fn google_sign_up(
    db: &MongoDB,
    config: &AppConfig,
    request: &GoogleSignUpRequest,
) -> Result<(Session, bool), AppError> {
    request.validate()?;

    let credential = request.credential.as_deref().unwrap_or_default();
    let identity = auth_service::verify_google_id_token(&config.google, credential)
        .await?
        .with_names(&request.first_name, &request.last_name);
    find_or_create_google_user(db, config, identity).await
}

/// OAuth callback path: the identity comes from Google's userinfo endpoint.
pub async fn google_sign_in(
    db: &MongoDB,
    config: &AppConfig,
    identity: GoogleIdentity,
) -> Result<(Session, bool), AppError> {
    find_or_create_google_user(db, config, identity).await
}

pub async fn login(db: &MongoDB, config: &AppConfig, request: &LoginRequest) -> Result<Session, AppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&Some(request.email.clone())).ok_or_else(invalid)?;
    let user = db
        .collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "email.address": &email })
        .await?
        .ok_or_else(invalid)?;

    let stored_hash = user.password.clone().ok_or_else(|| {
        AppError::Unauthorized("This account uses Google sign-in. Please sign in with Google.".to_string())
    })?;

    if !auth_service::verify_password(request.password.clone(), stored_hash).await? {
        return Err(invalid());
    }

    if !user.is_active() {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    let token = auth_service::generate_jwt(&config.jwt, &user)?;
    Ok(Session { token, user })
}

/// Newest first.
pub async fn list_users(db: &MongoDB) -> Result<Vec<User>, AppError> {
    let cursor = db
        .collection::<User>(USERS_COLLECTION)
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn get_user(db: &MongoDB, id: &str) -> Result<User, AppError> {
    let object_id = parse_object_id(id, "user")?;
    db.collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn update_user(db: &MongoDB, id: &str, patch: &UpdateUserRequest) -> Result<User, AppError> {
    let object_id = parse_object_id(id, "user")?;
    let set = patch.to_set_document()?;

    db.collection::<User>(USERS_COLLECTION)
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Returns the removed user so callers can name them.
pub async fn delete_user(db: &MongoDB, id: &str) -> Result<User, AppError> {
    let object_id = parse_object_id(id, "user")?;
    db.collection::<User>(USERS_COLLECTION)
        .find_one_and_delete(doc! { "_id": object_id })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
