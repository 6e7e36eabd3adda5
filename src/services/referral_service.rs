use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};

use crate::{
    database::MongoDB,
    models::{Referral, ReferralFields, User, REFERRALS_COLLECTION, USERS_COLLECTION},
    services::auth_service::Claims,
    utils::{error::AppError, validation::parse_object_id},
};

fn not_found() -> AppError {
    AppError::NotFound("Referral not found".to_string())
}

fn ensure_can_manage(claims: &Claims, referral: &Referral) -> Result<(), AppError> {
    if claims.can_manage(&referral.created_by.to_hex()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the referrer or an admin can modify this referral".to_string(),
        ))
    }
}

/// Creates a referral for the signed-in user; referrer details come from their account.
pub async fn create_referral(
    db: &MongoDB,
    creator_id: &str,
    fields: ReferralFields,
) -> Result<Referral, AppError> {
    fields.validate_new()?;

    let creator_oid = parse_object_id(creator_id, "user")?;
    let referrer = db
        .collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "_id": creator_oid })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut referral = Referral::new(fields, &referrer, creator_oid);
    let inserted = db
        .collection::<Referral>(REFERRALS_COLLECTION)
        .insert_one(&referral)
        .await?;
    referral.id = inserted.inserted_id.as_object_id();

    log::info!(
        "✅ Referral {} created by {}",
        referral.referral_case_number,
        creator_id
    );
    Ok(referral)
}

/// Newest first, optionally only those created by one user.
pub async fn list_referrals(db: &MongoDB, created_by: Option<ObjectId>) -> Result<Vec<Referral>, AppError> {
    let filter = match created_by {
        Some(user_id) => doc! { "createdBy": user_id },
        None => Document::new(),
    };

    let cursor = db
        .collection::<Referral>(REFERRALS_COLLECTION)
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn get_referral(db: &MongoDB, id: &str) -> Result<Referral, AppError> {
    let object_id = parse_object_id(id, "referral")?;
    db.collection::<Referral>(REFERRALS_COLLECTION)
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or_else(not_found)
}

/// Merges the patch into the stored referral and validates the result
/// before writing it back.
pub async fn update_referral(
    db: &MongoDB,
    claims: &Claims,
    id: &str,
    patch: &ReferralFields,
) -> Result<Referral, AppError> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("No valid fields provided to update".to_string()));
    }

    let mut referral = get_referral(db, id).await?;
    ensure_can_manage(claims, &referral)?;
    referral.apply_patch(patch)?;

    let result = db
        .collection::<Referral>(REFERRALS_COLLECTION)
        .replace_one(doc! { "_id": referral.id }, &referral)
        .await?;
    if result.matched_count == 0 {
        // deleted between the read and the write
        return Err(not_found());
    }

    Ok(referral)
}

/// Returns the removed referral so callers can report its case number.
pub async fn delete_referral(db: &MongoDB, claims: &Claims, id: &str) -> Result<Referral, AppError> {
    let referral = get_referral(db, id).await?;
    ensure_can_manage(claims, &referral)?;

    let result = db
        .collection::<Referral>(REFERRALS_COLLECTION)
        .delete_one(doc! { "_id": referral.id })
        .await?;
    if result.deleted_count == 0 {
        return Err(not_found());
    }

    log::info!("🗑️  Referral {} deleted by {}", referral.referral_case_number, claims.sub);
    Ok(referral)
}
