use mongodb::bson::{oid::ObjectId, DateTime};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::utils::{
    error::{AppError, FieldError},
    validation::{non_blank, require},
};

use super::user::User;

pub const REFERRALS_COLLECTION: &str = "referrals";
pub const MAX_STUDENT_PHOTOS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum RelationToStudent {
    Teacher,
    Parent,
    Mentor,
    Friend,
    Other,
}

/// Referral case as stored in MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub referral_case_number: String,

    // Referrer, copied from the creating user
    pub referrer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_phone: Option<String>,

    pub student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_email: Option<String>,
    pub student_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_guardian_phone: Option<String>,
    pub student_address: String,
    pub institution: String,
    pub university_year: String,
    pub department: String,
    #[serde(default)]
    pub has_disability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disability_details: Option<String>,
    #[serde(default)]
    pub has_family_support: bool,
    #[serde(default)]
    pub student_photos: Vec<String>,
    /// Path of an uploaded supporting document; not settable through the referral body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub need_description: String,
    pub relation_to_student: RelationToStudent,

    pub created_by: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// `REF-YYYYMMDD-XXXXXX`, the random suffix uppercase alphanumeric.
pub fn generate_case_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("REF-{}-{}", chrono::Utc::now().format("%Y%m%d"), suffix)
}

/// Client-settable referral fields. Anything else in the body is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralFields {
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub student_phone: Option<String>,
    pub student_guardian_phone: Option<String>,
    pub student_address: Option<String>,
    pub institution: Option<String>,
    pub university_year: Option<String>,
    pub department: Option<String>,
    pub has_disability: Option<bool>,
    pub disability_details: Option<String>,
    pub has_family_support: Option<bool>,
    pub student_photos: Option<Vec<String>>,
    pub need_description: Option<String>,
    pub relation_to_student: Option<RelationToStudent>,
}

impl ReferralFields {
    /// Full validation for a new referral.
    pub fn validate_new(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        require(&mut errors, "studentName", self.student_name.as_deref(), "Student's name is required");
        require(&mut errors, "studentPhone", self.student_phone.as_deref(), "Student's phone number is required");
        require(&mut errors, "studentAddress", self.student_address.as_deref(), "Student's address is required");
        require(&mut errors, "institution", self.institution.as_deref(), "Institution name is required");
        require(&mut errors, "universityYear", self.university_year.as_deref(), "University year is required");
        require(&mut errors, "department", self.department.as_deref(), "Department is required");
        require(&mut errors, "needDescription", self.need_description.as_deref(), "Description of need is required");
        if self.relation_to_student.is_none() {
            errors.push(FieldError::new("relationToStudent", "Relation to student is required"));
        }
        check_conditional(
            &mut errors,
            self.has_disability.unwrap_or(false),
            self.disability_details.as_deref(),
            self.student_photos.as_deref().unwrap_or_default(),
        );
        AppError::check(errors)
    }

    pub fn is_empty(&self) -> bool {
        self.student_name.is_none()
            && self.student_email.is_none()
            && self.student_phone.is_none()
            && self.student_guardian_phone.is_none()
            && self.student_address.is_none()
            && self.institution.is_none()
            && self.university_year.is_none()
            && self.department.is_none()
            && self.has_disability.is_none()
            && self.disability_details.is_none()
            && self.has_family_support.is_none()
            && self.student_photos.is_none()
            && self.need_description.is_none()
            && self.relation_to_student.is_none()
    }
}

/// Rules that depend on more than one field.
fn check_conditional(
    errors: &mut Vec<FieldError>,
    has_disability: bool,
    disability_details: Option<&str>,
    photos: &[String],
) {
    if has_disability && disability_details.map(str::trim).unwrap_or_default().is_empty() {
        errors.push(FieldError::new(
            "disabilityDetails",
            "Disability details are required when the student has a disability",
        ));
    }
    if photos.len() > MAX_STUDENT_PHOTOS {
        errors.push(FieldError::new(
            "studentPhotos",
            format!("You can upload a maximum of {} pictures.", MAX_STUDENT_PHOTOS),
        ));
    }
}

fn apply_required(target: &mut String, value: &Option<String>, field: &str, errors: &mut Vec<FieldError>) {
    if value.is_some() {
        match non_blank(value) {
            Some(v) => *target = v,
            None => errors.push(FieldError::new(field, format!("{} cannot be empty", field))),
        }
    }
}

fn apply_optional(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *target = non_blank(value);
    }
}

impl Referral {
    pub fn new(fields: ReferralFields, referrer: &User, created_by: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            referral_case_number: generate_case_number(),
            referrer_name: referrer.full_name(),
            referrer_email: Some(referrer.email.address.clone()),
            referrer_phone: referrer.phone_number.clone(),
            student_name: non_blank(&fields.student_name).unwrap_or_default(),
            student_email: non_blank(&fields.student_email),
            student_phone: non_blank(&fields.student_phone).unwrap_or_default(),
            student_guardian_phone: non_blank(&fields.student_guardian_phone),
            student_address: non_blank(&fields.student_address).unwrap_or_default(),
            institution: non_blank(&fields.institution).unwrap_or_default(),
            university_year: non_blank(&fields.university_year).unwrap_or_default(),
            department: non_blank(&fields.department).unwrap_or_default(),
            has_disability: fields.has_disability.unwrap_or(false),
            disability_details: non_blank(&fields.disability_details),
            has_family_support: fields.has_family_support.unwrap_or(false),
            student_photos: fields.student_photos.unwrap_or_default(),
            document: None,
            need_description: non_blank(&fields.need_description).unwrap_or_default(),
            // validate_new has already rejected a missing relation
            relation_to_student: fields.relation_to_student.unwrap_or(RelationToStudent::Other),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a patch and re-validates the merged document.
    pub fn apply_patch(&mut self, patch: &ReferralFields) -> Result<(), AppError> {
        let mut errors = Vec::new();

        apply_required(&mut self.student_name, &patch.student_name, "studentName", &mut errors);
        apply_required(&mut self.student_phone, &patch.student_phone, "studentPhone", &mut errors);
        apply_required(&mut self.student_address, &patch.student_address, "studentAddress", &mut errors);
        apply_required(&mut self.institution, &patch.institution, "institution", &mut errors);
        apply_required(&mut self.university_year, &patch.university_year, "universityYear", &mut errors);
        apply_required(&mut self.department, &patch.department, "department", &mut errors);
        apply_required(&mut self.need_description, &patch.need_description, "needDescription", &mut errors);

        apply_optional(&mut self.student_email, &patch.student_email);
        apply_optional(&mut self.student_guardian_phone, &patch.student_guardian_phone);
        apply_optional(&mut self.disability_details, &patch.disability_details);

        if let Some(v) = patch.has_disability {
            self.has_disability = v;
        }
        if let Some(v) = patch.has_family_support {
            self.has_family_support = v;
        }
        if let Some(photos) = &patch.student_photos {
            self.student_photos = photos.clone();
        }
        if let Some(relation) = patch.relation_to_student {
            self.relation_to_student = relation;
        }

        check_conditional(
            &mut errors,
            self.has_disability,
            self.disability_details.as_deref(),
            &self.student_photos,
        );
        AppError::check(errors)?;

        self.updated_at = DateTime::now();
        Ok(())
    }
}

// ==================== RESPONSES ====================

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralResponse {
    pub id: String,
    pub referral_case_number: String,
    pub referrer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_phone: Option<String>,
    pub student_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_email: Option<String>,
    pub student_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_guardian_phone: Option<String>,
    pub student_address: String,
    pub institution: String,
    pub university_year: String,
    pub department: String,
    pub has_disability: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disability_details: Option<String>,
    pub has_family_support: bool,
    pub student_photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub need_description: String,
    pub relation_to_student: RelationToStudent,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Referral> for ReferralResponse {
    fn from(r: Referral) -> Self {
        ReferralResponse {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            referral_case_number: r.referral_case_number,
            referrer_name: r.referrer_name,
            referrer_email: r.referrer_email,
            referrer_phone: r.referrer_phone,
            student_name: r.student_name,
            student_email: r.student_email,
            student_phone: r.student_phone,
            student_guardian_phone: r.student_guardian_phone,
            student_address: r.student_address,
            institution: r.institution,
            university_year: r.university_year,
            department: r.department,
            has_disability: r.has_disability,
            disability_details: r.disability_details,
            has_family_support: r.has_family_support,
            student_photos: r.student_photos,
            document: r.document,
            need_description: r.need_description,
            relation_to_student: r.relation_to_student,
            created_by: r.created_by.to_hex(),
            created_at: r.created_at.try_to_rfc3339_string().unwrap_or_default(),
            updated_at: r.updated_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}
