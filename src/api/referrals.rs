use actix_web::{web, HttpResponse};

use crate::{
    database::MongoDB,
    middleware::auth::Claims,
    models::{Referral, ReferralFields, ReferralResponse},
    services::referral_service,
    utils::{error::AppError, validation::parse_object_id},
};

fn referral_json(referral: Referral) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "data": { "referral": ReferralResponse::from(referral) }
    })
}

fn list_json(referrals: Vec<Referral>) -> serde_json::Value {
    let referrals: Vec<ReferralResponse> = referrals.into_iter().map(ReferralResponse::from).collect();
    serde_json::json!({
        "status": "success",
        "results": referrals.len(),
        "data": { "referrals": referrals }
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/referrals",
    tag = "Referrals",
    request_body = ReferralFields,
    responses(
        (status = 201, description = "Referral created", body = ReferralResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Referrer account not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<ReferralFields>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /referrals - by {}", claims.sub);

    let referral = referral_service::create_referral(&db, &claims.sub, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(referral_json(referral)))
}

#[utoipa::path(
    get,
    path = "/api/v1/referrals",
    tag = "Referrals",
    responses(
        (status = 200, description = "All referrals, newest first"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_all(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    log::info!("📋 GET /referrals");

    let referrals = referral_service::list_referrals(&db, None).await?;
    Ok(HttpResponse::Ok().json(list_json(referrals)))
}

#[utoipa::path(
    get,
    path = "/api/v1/referrals/mine",
    tag = "Referrals",
    responses(
        (status = 200, description = "Referrals created by the signed-in user"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_mine(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
) -> Result<HttpResponse, AppError> {
    log::info!("📋 GET /referrals/mine - user {}", claims.sub);

    let user_id = parse_object_id(&claims.sub, "user")?;
    let referrals = referral_service::list_referrals(&db, Some(user_id)).await?;
    Ok(HttpResponse::Ok().json(list_json(referrals)))
}

#[utoipa::path(
    get,
    path = "/api/v1/referrals/{id}",
    tag = "Referrals",
    params(("id" = String, Path, description = "Referral ObjectId")),
    responses(
        (status = 200, description = "Referral found", body = ReferralResponse),
        (status = 404, description = "Referral not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_one(
    db: web::Data<MongoDB>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔍 GET /referrals/{}", id);

    let referral = referral_service::get_referral(&db, &id).await?;
    Ok(HttpResponse::Ok().json(referral_json(referral)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/referrals/{id}",
    tag = "Referrals",
    params(("id" = String, Path, description = "Referral ObjectId")),
    request_body = ReferralFields,
    responses(
        (status = 200, description = "Referral updated", body = ReferralResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the referrer"),
        (status = 404, description = "Referral not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    id: web::Path<String>,
    request: web::Json<ReferralFields>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔧 PATCH /referrals/{} - by {}", id, claims.sub);

    let referral = referral_service::update_referral(&db, &claims, &id, &request).await?;
    Ok(HttpResponse::Ok().json(referral_json(referral)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/referrals/{id}",
    tag = "Referrals",
    params(("id" = String, Path, description = "Referral ObjectId")),
    responses(
        (status = 200, description = "Referral deleted"),
        (status = 403, description = "Not the referrer"),
        (status = 404, description = "Referral not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️  DELETE /referrals/{} - by {}", id, claims.sub);

    let referral = referral_service::delete_referral(&db, &claims, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Referral {} has been successfully deleted.", referral.referral_case_number),
        "data": null
    })))
}
