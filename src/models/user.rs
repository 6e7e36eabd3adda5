use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::utils::{
    error::{AppError, FieldError},
    validation::{is_valid_email, non_blank, require},
};

pub const USERS_COLLECTION: &str = "users";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

/// Email shared between manual and Google sign-ups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    pub address: String,
    #[serde(default)]
    pub verified: bool,
}

/// User document as stored in MongoDB.
///
/// Optional identity fields are omitted rather than stored as null so the
/// sparse unique indexes on them keep ignoring absent values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: EmailAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// bcrypt hash; absent for Google-only accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token_expires_at: Option<DateTime>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub role: UserRole,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Builds an unverified manual sign-up. `password_hash` must already be hashed.
    pub fn new_local(request: &CreateUserRequest, password_hash: String) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            first_name: non_blank(&request.first_name).unwrap_or_default(),
            last_name: non_blank(&request.last_name).unwrap_or_default(),
            email: EmailAddress {
                address: request.normalized_email().unwrap_or_default(),
                verified: false,
            },
            google_id: None,
            phone_number: non_blank(&request.phone_number),
            password: Some(password_hash),
            profession: non_blank(&request.profession),
            verification_token: None,
            verification_token_expires_at: None,
            status: request.status.unwrap_or_default(),
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only built from an identity whose email Google has verified.
    pub fn new_google(identity: &GoogleIdentity) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            email: EmailAddress {
                address: identity.email.clone(),
                verified: true,
            },
            google_id: Some(identity.google_id.clone()),
            phone_number: None,
            password: None,
            profession: None,
            verification_token: None,
            verification_token_expires_at: None,
            status: UserStatus::Active,
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn normalize_email(email: &Option<String>) -> Option<String> {
    non_blank(email).map(|e| e.to_lowercase())
}

/// Field rules shared by every way a user document comes into existence.
fn validate_identity(
    errors: &mut Vec<FieldError>,
    first_name: Option<&str>,
    last_name: Option<&str>,
    email: Option<&str>,
) {
    require(errors, "firstName", first_name, "First name is required");
    require(errors, "lastName", last_name, "Last name is required");
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        None => errors.push(FieldError::new("email", "Email is required")),
        Some(e) if !is_valid_email(e) => {
            errors.push(FieldError::new("email", "Email address is not valid"))
        }
        Some(_) => {}
    }
}

// ==================== REQUESTS ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub profession: Option<String>,
    pub status: Option<UserStatus>,
}

impl CreateUserRequest {
    pub fn normalized_email(&self) -> Option<String> {
        normalize_email(&self.email)
    }

    /// Manual sign-ups have no Google identity, so the password is always required.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        validate_identity(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.email.as_deref(),
        );
        match self.password.as_deref() {
            None | Some("") => errors.push(FieldError::new("password", "Password is required")),
            Some(p) if p.chars().count() < MIN_PASSWORD_LEN => errors.push(FieldError::new(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            )),
            Some(_) => {}
        }
        AppError::check(errors)
    }
}

/// Sign-in with a Google ID token obtained by the client.
///
/// The Google ID and email are taken from the verified token; the optional
/// names override the ones on the Google profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignUpRequest {
    pub credential: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl GoogleSignUpRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        require(&mut errors, "credential", self.credential.as_deref(), "Google credential is required");
        AppError::check(errors)
    }
}

/// A Google account as reported by Google itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub google_id: String,
    /// Lowercased.
    pub email: String,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
}

impl GoogleIdentity {
    /// Accounts are matched by email, so an unverified Google email must not sign in.
    pub fn ensure_verified(&self) -> Result<(), AppError> {
        if self.google_id.trim().is_empty() || self.email.trim().is_empty() {
            return Err(AppError::Unauthorized("Google account has no usable identity".to_string()));
        }
        if !self.email_verified {
            return Err(AppError::Unauthorized("Google account email is not verified".to_string()));
        }
        Ok(())
    }

    /// Names from the sign-up body win over Google's when present.
    pub fn with_names(mut self, first_name: &Option<String>, last_name: &Option<String>) -> Self {
        if let Some(first) = non_blank(first_name) {
            self.first_name = first;
        }
        if let Some(last) = non_blank(last_name) {
            self.last_name = last;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EmailVerificationRequest {
    pub email: String,
}

/// Only the name can be changed through the update endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UpdateUserRequest {
    pub fn to_set_document(&self) -> Result<Document, AppError> {
        let mut set = Document::new();
        if let Some(first_name) = non_blank(&self.first_name) {
            set.insert("firstName", first_name);
        }
        if let Some(last_name) = non_blank(&self.last_name) {
            set.insert("lastName", last_name);
        }
        if set.is_empty() {
            return Err(AppError::BadRequest("No valid fields provided to update".to_string()));
        }
        set.insert("updatedAt", DateTime::now());
        Ok(set)
    }
}

// ==================== RESPONSES ====================

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct EmailResponse {
    pub address: String,
    pub verified: bool,
}

/// Public view of a user; never carries the password hash or verification token.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: EmailResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    pub status: UserStatus,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            id: u.id_hex(),
            first_name: u.first_name,
            last_name: u.last_name,
            email: EmailResponse {
                address: u.email.address,
                verified: u.email.verified,
            },
            google_id: u.google_id,
            phone_number: u.phone_number,
            profession: u.profession,
            status: u.status,
            role: u.role,
            created_at: u.created_at.try_to_rfc3339_string().unwrap_or_default(),
            updated_at: u.updated_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

/// Filter matching any user that already owns this email or phone number.
pub fn identity_conflict_filter(email: &str, phone_number: Option<&str>) -> Document {
    let mut any_of = vec![doc! { "email.address": email }];
    if let Some(phone) = phone_number {
        any_of.push(doc! { "phoneNumber": phone });
    }
    doc! { "$or": any_of }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_request() -> CreateUserRequest {
        CreateUserRequest {
            first_name: Some("Tsion".into()),
            last_name: Some("Ephrem".into()),
            email: Some("Tsion@Example.org".into()),
            phone_number: Some("+251911000000".into()),
            password: Some("secret1".into()),
            profession: None,
            status: None,
        }
    }

    fn field_names(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn manual_signup_requires_password() {
        let mut request = manual_request();
        request.password = None;
        assert_eq!(field_names(request.validate().unwrap_err()), vec!["password"]);
    }

    #[test]
    fn manual_signup_enforces_password_length() {
        let mut request = manual_request();
        request.password = Some("12345".into());
        assert_eq!(field_names(request.validate().unwrap_err()), vec!["password"]);
    }

    #[test]
    fn missing_names_and_email_are_all_reported() {
        let request = CreateUserRequest {
            password: Some("secret1".into()),
            ..Default::default()
        };
        assert_eq!(
            field_names(request.validate().unwrap_err()),
            vec!["firstName", "lastName", "email"]
        );
    }

    fn google_identity() -> GoogleIdentity {
        GoogleIdentity {
            google_id: "1098".into(),
            email: "abebe@example.org".into(),
            email_verified: true,
            first_name: "Abebe".into(),
            last_name: "Kebede".into(),
        }
    }

    #[test]
    fn google_user_has_no_password() {
        let user = User::new_google(&google_identity());
        assert!(user.password.is_none());
        assert!(user.email.verified);
        assert_eq!(user.google_id.as_deref(), Some("1098"));
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn google_signup_requires_credential() {
        // a body naming an account is not enough without a Google-signed credential
        let request: GoogleSignUpRequest = serde_json::from_value(serde_json::json!({
            "googleId": "1098",
            "firstName": "Abebe",
            "lastName": "Kebede",
            "email": "admin@example.org"
        }))
        .unwrap();
        assert_eq!(field_names(request.validate().unwrap_err()), vec!["credential"]);

        let request = GoogleSignUpRequest {
            credential: Some("eyJhbGciOi...".into()),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn unverified_google_email_is_rejected() {
        assert!(google_identity().ensure_verified().is_ok());

        let unverified = GoogleIdentity {
            email_verified: false,
            ..google_identity()
        };
        assert!(matches!(unverified.ensure_verified(), Err(AppError::Unauthorized(_))));

        let anonymous = GoogleIdentity {
            email: String::new(),
            ..google_identity()
        };
        assert!(anonymous.ensure_verified().is_err());
    }

    #[test]
    fn body_names_override_google_names() {
        let identity = google_identity().with_names(&Some("Abe".into()), &Some("  ".into()));
        assert_eq!(identity.first_name, "Abe");
        assert_eq!(identity.last_name, "Kebede");
    }

    #[test]
    fn new_local_user_is_unverified_with_lowercased_email() {
        let user = User::new_local(&manual_request(), "$2b$12$hash".into());
        assert!(!user.email.verified);
        assert_eq!(user.email.address, "tsion@example.org");
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.full_name(), "Tsion Ephrem");
    }

    #[test]
    fn stored_document_omits_absent_identity_fields() {
        let request = CreateUserRequest {
            phone_number: None,
            ..manual_request()
        };
        let user = User::new_local(&request, "$2b$12$hash".into());
        let document = mongodb::bson::to_document(&user).unwrap();
        assert!(!document.contains_key("googleId"));
        assert!(!document.contains_key("phoneNumber"));
        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_document("email").unwrap().get_bool("verified").unwrap(), false);
        assert_eq!(document.get_str("status").unwrap(), "Active");
        assert_eq!(document.get_str("role").unwrap(), "user");
    }

    #[test]
    fn response_hides_secrets() {
        let mut user = User::new_local(&manual_request(), "$2b$12$hash".into());
        user.verification_token = Some("token".into());
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("verificationToken").is_none());
        assert_eq!(json["email"]["address"], "tsion@example.org");
        assert_eq!(json["firstName"], "Tsion");
    }

    #[test]
    fn update_only_takes_names() {
        let patch: UpdateUserRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Selam",
            "email": "hijack@example.org",
            "role": "admin"
        }))
        .unwrap();
        let set = patch.to_set_document().unwrap();
        assert_eq!(set.get_str("firstName").unwrap(), "Selam");
        assert!(!set.contains_key("email"));
        assert!(!set.contains_key("role"));
        assert!(!set.contains_key("lastName"));
        assert!(set.contains_key("updatedAt"));
    }

    #[test]
    fn empty_update_is_rejected() {
        let patch = UpdateUserRequest {
            first_name: Some("  ".into()),
            last_name: None,
        };
        assert!(matches!(patch.to_set_document(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn conflict_filter_only_checks_phone_when_given() {
        let without_phone = identity_conflict_filter("a@example.org", None);
        assert_eq!(without_phone.get_array("$or").unwrap().len(), 1);

        let with_phone = identity_conflict_filter("a@example.org", Some("+251"));
        assert_eq!(with_phone.get_array("$or").unwrap().len(), 2);
    }
}
