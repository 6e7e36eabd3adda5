mod api;
mod config;
mod database;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::services::email_service::{EmailSender, LogMailer, SmtpMailer};

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    log::error!("❌ {}: {}", context, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    log::info!("🚀 Starting Referral Service...");

    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to MongoDB", e))?;
    log::info!("✅ MongoDB connected successfully");

    let mailer: Arc<dyn EmailSender> = match &config.smtp {
        Some(smtp) => {
            log::info!("📧 SMTP relay: {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(smtp).map_err(|e| startup_error("Invalid SMTP settings", e))?)
        }
        None => {
            log::warn!("⚠️  SMTP_HOST not set, verification emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let bind_addr = format!("{}:{}", config.host, config.port);
    log::info!("🌐 Server starting on {}", bind_addr);
    log::info!("📚 Swagger UI available at: http://{}/swagger-ui/", bind_addr);

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config);
    let mailer_data: web::Data<dyn EmailSender> = web::Data::from(mailer);

    HttpServer::new(move || {
        let cors = config_data
            .cors_allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(mailer_data.clone())
            .app_data(api::json_config())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(actix_web::middleware::Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", api::swagger::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
