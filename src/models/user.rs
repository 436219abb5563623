use chrono::{DateTime, Utc};
use mongodb::bson;
use serde::{Deserialize, Serialize};

/// Stored account row in `user_profiles`. The password is always a bcrypt hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub email_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    pub created_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signin: Option<bson::DateTime>,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UserProfileDocument> for User {
    fn from(doc: &UserProfileDocument) -> Self {
        Self {
            id: doc.id.clone(),
            email: doc.email.clone(),
            name: doc.username.clone(),
            created_at: DateTime::from_timestamp_millis(doc.created_at.timestamp_millis())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub email: String,
    pub code: String,
}

/// Result of register/login. A user who still has to confirm the address
/// gets `needs_confirmation` and no token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub needs_confirmation: bool,
}

/// Username used when registration does not provide one: the local part
/// of the e-mail address.
pub fn default_username(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_username_is_email_local_part() {
        assert_eq!(default_username("hana@example.com"), "hana");
        assert_eq!(default_username("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_user_view_hides_password() {
        let doc = UserProfileDocument {
            id: "u1".to_string(),
            email: "hana@example.com".to_string(),
            username: "hana".to_string(),
            password: "$2b$12$hash".to_string(),
            email_confirmed: true,
            confirmation_code: None,
            created_at: bson::DateTime::from_millis(0),
            last_signin: None,
        };

        let json = serde_json::to_value(User::from(&doc)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["name"], "hana");
    }
}
