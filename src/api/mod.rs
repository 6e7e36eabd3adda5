pub mod auth;
pub mod health;
pub mod referrals;
pub mod swagger;
pub mod users;

use actix_web::{guard, web};

use crate::{middleware::AuthMiddleware, utils::error::AppError};

/// Malformed JSON bodies get the same `fail` envelope as validation errors.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            log::warn!("⚠️  Rejected JSON body: {}", err);
            AppError::BadRequest(format!("Invalid request body: {}", err)).into()
        })
}

/// Collection roots answer with and without a trailing slash.
const COLLECTION: [&str; 2] = ["", "/"];

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1/auth")
                .route("/google", web::get().to(auth::google_auth))
                .route("/callback", web::get().to(auth::google_callback)),
        )
        .service(
            web::scope("/api/v1/users")
                .route("/GoogleSignUp", web::post().to(users::google_sign_up))
                .route("/login", web::post().to(users::login))
                .route("/requestEmailVerification", web::post().to(users::request_email_verification))
                .route("/verifyEmail/{verification_token}", web::get().to(users::verify_email))
                .service(
                    web::resource("/ReadMine")
                        .wrap(AuthMiddleware::user())
                        .route(web::get().to(users::read_mine)),
                )
                // Listing is admin-only, sign-up is public
                .service(
                    web::resource(COLLECTION)
                        .guard(guard::Get())
                        .wrap(AuthMiddleware::admin())
                        .route(web::get().to(users::read_all)),
                )
                .service(web::resource(COLLECTION).route(web::post().to(users::create_user)))
                .service(
                    web::resource("/{id}")
                        .guard(guard::Any(guard::Patch()).or(guard::Delete()))
                        .wrap(AuthMiddleware::user())
                        .route(web::patch().to(users::update))
                        .route(web::delete().to(users::delete)),
                )
                .route("/{id}", web::get().to(users::read_one)),
        )
        .service(
            web::scope("/api/v1/referrals")
                .wrap(AuthMiddleware::user())
                .service(
                    web::resource(COLLECTION)
                        .route(web::post().to(referrals::create))
                        .route(web::get().to(referrals::read_all)),
                )
                .route("/mine", web::get().to(referrals::read_mine))
                .route("/{id}", web::get().to(referrals::read_one))
                .route("/{id}", web::patch().to(referrals::update))
                .route("/{id}", web::delete().to(referrals::delete)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::tests::lazy_db;
    use crate::models::{CreateUserRequest, User, UserRole};
    use crate::services::auth_service::generate_jwt;
    use crate::services::email_service::{EmailSender, LogMailer};
    use crate::services::auth_service::OAUTH_STATE_COOKIE;
    use actix_web::{cookie::Cookie, http::StatusCode, test, App};
    use mongodb::bson::oid::ObjectId;
    use std::sync::Arc;

    fn token_for(role: UserRole) -> (String, String) {
        let mut user = User::new_local(
            &CreateUserRequest {
                first_name: Some("Ada".into()),
                last_name: Some("Lovelace".into()),
                email: Some("ada@example.org".into()),
                password: Some("secret1".into()),
                ..Default::default()
            },
            "hash".into(),
        );
        user.id = Some(ObjectId::new());
        user.role = role;
        let token = generate_jwt(&AppConfig::for_tests().jwt, &user).unwrap();
        (token, user.id_hex())
    }

    macro_rules! app {
        () => {
            app!(AppConfig::for_tests())
        };
        ($config:expr) => {{
            let mailer: Arc<dyn EmailSender> = Arc::new(LogMailer);
            test::init_service(
                App::new()
                    .app_data(web::Data::new(lazy_db().await))
                    .app_data(web::Data::new($config))
                    .app_data(web::Data::from(mailer))
                    .app_data(json_config())
                    .configure(configure),
            )
            .await
        }};
    }

    fn google_config() -> AppConfig {
        let mut config = AppConfig::for_tests();
        config.google.client_id = Some("client-123".into());
        config
    }

    macro_rules! status_of {
        ($app:expr, $req:expr) => {
            match test::try_call_service(&$app, $req.to_request()).await {
                Ok(res) => res.status(),
                Err(e) => e.error_response().status(),
            }
        };
    }

    #[actix_web::test]
    async fn referrals_require_a_token() {
        let app = app!();
        let status = status_of!(app, test::TestRequest::get().uri("/api/v1/referrals"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = status_of!(app, test::TestRequest::get().uri("/api/v1/referrals/mine"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn listing_users_is_admin_only() {
        let app = app!();
        let (token, _) = token_for(UserRole::User);
        let req = test::TestRequest::get()
            .uri("/api/v1/users")
            .insert_header(("Authorization", format!("Bearer {}", token)));
        assert_eq!(status_of!(app, req), StatusCode::FORBIDDEN);

        let status = status_of!(app, test::TestRequest::get().uri("/api/v1/users"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn sign_up_validates_before_touching_the_database() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(serde_json::json!({ "firstName": "Ada", "email": "not-an-email" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "fail");
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"password"));
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/users/login")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn users_cannot_modify_other_accounts() {
        let app = app!();
        let (token, _) = token_for(UserRole::User);
        let other = ObjectId::new().to_hex();

        let req = test::TestRequest::patch()
            .uri(&format!("/api/v1/users/{}", other))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(serde_json::json!({ "firstName": "Mallory" }));
        assert_eq!(status_of!(app, req), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/users/{}", other))
            .insert_header(("Authorization", format!("Bearer {}", token)));
        assert_eq!(status_of!(app, req), StatusCode::FORBIDDEN);

        let status = status_of!(app, test::TestRequest::delete().uri(&format!("/api/v1/users/{}", other)));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn malformed_verification_request_is_rejected() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/users/requestEmailVerification")
            .set_json(serde_json::json!({}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn collection_routes_accept_a_trailing_slash() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/users/")
            .set_json(serde_json::json!({ "firstName": "Ada" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Validation failed");

        let (token, _) = token_for(UserRole::User);
        let req = test::TestRequest::get()
            .uri("/api/v1/users/")
            .insert_header(("Authorization", format!("Bearer {}", token)));
        assert_eq!(status_of!(app, req), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/v1/referrals/")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(serde_json::json!({}));
        let res = test::call_service(&app, req.to_request()).await;
        // routed to create, which rejects the empty body
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn google_sign_up_needs_a_credential_not_just_an_email() {
        let app = app!(google_config());
        let req = test::TestRequest::post()
            .uri("/api/v1/users/GoogleSignUp")
            .set_json(serde_json::json!({
                "googleId": "x",
                "firstName": "a",
                "lastName": "b",
                "email": "admin@example.org"
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["errors"][0]["field"], "credential");
        assert!(body.get("token").is_none());
    }

    #[actix_web::test]
    async fn google_auth_sets_the_state_cookie() {
        let app = app!(google_config());
        let req = test::TestRequest::get().uri("/api/v1/auth/google").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let cookie = res
            .response()
            .cookies()
            .find(|c| c.name() == OAUTH_STATE_COOKIE)
            .expect("state cookie");
        assert!(cookie.http_only().unwrap_or(false));
        let cookie_value = cookie.value().to_string();

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["state"], cookie_value.as_str());
    }

    #[actix_web::test]
    async fn google_callback_rejects_unbound_state() {
        let app = app!(google_config());

        let req = test::TestRequest::get().uri("/api/v1/auth/google").to_request();
        let res = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(res).await;
        let state = body["state"].as_str().unwrap().to_string();

        // state minted for someone else's browser, no cookie here
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/auth/callback?code=abc&state={}", state));
        assert_eq!(status_of!(app, req), StatusCode::UNAUTHORIZED);

        // cookie present but a different state in the query
        let req = test::TestRequest::get()
            .uri("/api/v1/auth/callback?code=abc&state=forged")
            .cookie(Cookie::new(OAUTH_STATE_COOKIE, state.clone()));
        assert_eq!(status_of!(app, req), StatusCode::UNAUTHORIZED);

        // no state at all
        let req = test::TestRequest::get()
            .uri("/api/v1/auth/callback?code=abc")
            .cookie(Cookie::new(OAUTH_STATE_COOKIE, state));
        assert_eq!(status_of!(app, req), StatusCode::UNAUTHORIZED);
    }
}
