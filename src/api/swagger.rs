use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Referral Service API",
        version = "1.0.0",
        description = "Accounts and student referral cases for the donation platform.\n\n**Authentication:** protected endpoints take a JWT bearer token issued by sign-up, Google sign-in or login."
    ),
    paths(
        crate::api::health::health_check,

        crate::api::auth::google_auth,
        crate::api::auth::google_callback,

        crate::api::users::create_user,
        crate::api::users::google_sign_up,
        crate::api::users::login,
        crate::api::users::request_email_verification,
        crate::api::users::verify_email,
        crate::api::users::read_all,
        crate::api::users::read_mine,
        crate::api::users::read_one,
        crate::api::users::update,
        crate::api::users::delete,

        crate::api::referrals::create,
        crate::api::referrals::read_all,
        crate::api::referrals::read_mine,
        crate::api::referrals::read_one,
        crate::api::referrals::update,
        crate::api::referrals::delete,
    ),
    components(
        schemas(
            crate::api::health::HealthResponse,
            crate::services::auth_service::GoogleAuthUrlResponse,
            crate::models::CreateUserRequest,
            crate::models::GoogleSignUpRequest,
            crate::models::LoginRequest,
            crate::models::EmailVerificationRequest,
            crate::models::UpdateUserRequest,
            crate::models::UserResponse,
            crate::models::EmailResponse,
            crate::models::UserStatus,
            crate::models::UserRole,
            crate::models::ReferralFields,
            crate::models::ReferralResponse,
            crate::models::RelationToStudent,
            crate::utils::error::FieldError,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and database reachability."),
        (name = "Auth", description = "Google OAuth authorization-code flow."),
        (name = "Users", description = "Sign-up, login, email verification and account management."),
        (name = "Referrals", description = "Student referral cases submitted by signed-in users."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter your JWT token"))
                        .build(),
                ),
            );
        }
    }
}
