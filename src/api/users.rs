use actix_web::{web, HttpResponse};

use crate::{
    config::AppConfig,
    database::MongoDB,
    middleware::auth::Claims,
    models::{
        CreateUserRequest, EmailVerificationRequest, GoogleSignUpRequest, LoginRequest,
        UpdateUserRequest, UserResponse,
    },
    services::{email_service::EmailSender, user_service, verification_service},
    utils::error::AppError,
};

fn session_json(session: user_service::Session) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "token": session.token,
        "user": UserResponse::from(session.user)
    })
}

fn user_json(user: crate::models::User) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": { "user": UserResponse::from(user) }
    })
}

fn ensure_can_manage(claims: &Claims, user_id: &str) -> Result<(), AppError> {
    if claims.can_manage(user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("You can only modify your own account".to_string()))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created, verification email sent"),
        (status = 400, description = "Validation failed or email/phone already registered")
    )
)]
pub async fn create_user(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    mailer: web::Data<dyn EmailSender>,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /users - email: {}", request.email.as_deref().unwrap_or("N/A"));

    let session = user_service::create_user(&db, &config, mailer.get_ref(), request.into_inner()).await?;
    Ok(HttpResponse::Created().json(session_json(session)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/GoogleSignUp",
    tag = "Users",
    request_body = GoogleSignUpRequest,
    responses(
        (status = 200, description = "Existing user signed in"),
        (status = 201, description = "New Google user created"),
        (status = 400, description = "Missing Google credential"),
        (status = 401, description = "Credential rejected by Google or email not verified"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn google_sign_up(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<GoogleSignUpRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /users/GoogleSignUp");

    let (session, created) = user_service::google_sign_up(&db, &config, &request).await?;
    log::info!("✅ Google sign-in for {}", session.user.email.address);
    let body = session_json(session);
    Ok(if created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "Users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /users/login - email: {}", request.email);

    let session = user_service::login(&db, &config, &request).await?;
    log::info!("✅ Login successful: {}", request.email);
    Ok(HttpResponse::Ok().json(session_json(session)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/requestEmailVerification",
    tag = "Users",
    request_body = EmailVerificationRequest,
    responses(
        (status = 200, description = "Verification email sent"),
        (status = 400, description = "Email already verified"),
        (status = 404, description = "No user with that email")
    )
)]
pub async fn request_email_verification(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    mailer: web::Data<dyn EmailSender>,
    request: web::Json<EmailVerificationRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📧 POST /users/requestEmailVerification - email: {}", request.email);

    verification_service::request_email_verification(&db, &config, mailer.get_ref(), &request.email).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Verification email sent."
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/verifyEmail/{verification_token}",
    tag = "Users",
    params(("verification_token" = String, Path, description = "Token from the emailed link")),
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Invalid or expired verification token")
    )
)]
pub async fn verify_email(
    db: web::Data<MongoDB>,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("✓ GET /users/verifyEmail");

    let user = verification_service::verify_email(&db, &token).await?;
    log::info!("✅ Email verified for user {}", user.id_hex());
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Your email has been successfully verified."
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users, newest first"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_all(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    log::info!("📋 GET /users");

    let users: Vec<UserResponse> = user_service::list_users(&db)
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "results": users.len(),
        "data": { "users": users }
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/ReadMine",
    tag = "Users",
    responses(
        (status = 200, description = "The signed-in user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_mine(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
) -> Result<HttpResponse, AppError> {
    log::info!("👤 GET /users/ReadMine - user {}", claims.sub);

    let user = user_service::get_user(&db, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(user_json(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn read_one(
    db: web::Data<MongoDB>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("👤 GET /users/{}", id);

    let user = user_service::get_user(&db, &id).await?;
    Ok(HttpResponse::Ok().json(user_json(user)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "No valid fields provided"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    id: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔧 PATCH /users/{} - by {}", id, claims.sub);
    ensure_can_manage(&claims, &id)?;

    let user = user_service::update_user(&db, &id, &request).await?;
    Ok(HttpResponse::Ok().json(user_json(user)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️  DELETE /users/{} - by {}", id, claims.sub);
    ensure_can_manage(&claims, &id)?;

    let user = user_service::delete_user(&db, &id).await?;
    log::info!("✅ User {} deleted", id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("{} has been successfully deleted.", user.full_name()),
        "data": null
    })))
}
