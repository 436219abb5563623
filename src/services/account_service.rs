use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{self, doc};
use mongodb::error::{ErrorKind, WriteError, WriteFailure};
use mongodb::{Collection, Database};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::Mutex;

use crate::error::PlannerError;
use crate::middleware::auth::generate_token;
use crate::models::user::{
    default_username, AuthOutcome, ConfirmRequest, LoginRequest, RegisterRequest, User,
    UserProfileDocument,
};

pub const PROFILES_COLLECTION: &str = "user_profiles";
pub const CONFIRMATION_CODE_LENGTH: usize = 8;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfileDocument>, PlannerError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfileDocument>, PlannerError>;
    /// Conflict when the e-mail address is already registered.
    async fn insert(&self, profile: &UserProfileDocument) -> Result<(), PlannerError>;
    async fn mark_confirmed(&self, id: &str) -> Result<(), PlannerError>;
    async fn record_signin(&self, id: &str) -> Result<(), PlannerError>;
}

pub struct MongoAccountStore {
    collection: Collection<UserProfileDocument>,
}

impl MongoAccountStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(PROFILES_COLLECTION),
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code: 11000, .. }))
    )
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfileDocument>, PlannerError> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfileDocument>, PlannerError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn insert(&self, profile: &UserProfileDocument) -> Result<(), PlannerError> {
        match self.collection.insert_one(profile).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(PlannerError::Conflict(format!("account {}", profile.email)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_confirmed(&self, id: &str) -> Result<(), PlannerError> {
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": { "email_confirmed": true },
                    "$unset": { "confirmation_code": "" },
                },
            )
            .await?;
        Ok(())
    }

    async fn record_signin(&self, id: &str) -> Result<(), PlannerError> {
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "last_signin": bson::DateTime::now() } },
            )
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    profiles: Mutex<Vec<UserProfileDocument>>,
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfileDocument>, PlannerError> {
        let profiles = self.profiles.lock().await;
        Ok(profiles.iter().find(|p| p.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserProfileDocument>, PlannerError> {
        let profiles = self.profiles.lock().await;
        Ok(profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, profile: &UserProfileDocument) -> Result<(), PlannerError> {
        let mut profiles = self.profiles.lock().await;
        if profiles.iter().any(|p| p.email == profile.email) {
            return Err(PlannerError::Conflict(format!("account {}", profile.email)));
        }
        profiles.push(profile.clone());
        Ok(())
    }

    async fn mark_confirmed(&self, id: &str) -> Result<(), PlannerError> {
        let mut profiles = self.profiles.lock().await;
        if let Some(profile) = profiles.iter_mut().find(|p| p.id == id) {
            profile.email_confirmed = true;
            profile.confirmation_code = None;
        }
        Ok(())
    }

    async fn record_signin(&self, id: &str) -> Result<(), PlannerError> {
        let mut profiles = self.profiles.lock().await;
        if let Some(profile) = profiles.iter_mut().find(|p| p.id == id) {
            profile.last_signin = Some(bson::DateTime::now());
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    regex::Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*$",
    )
    .map(|re| re.is_match(email))
    .unwrap_or(false)
}

fn confirmation_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONFIRMATION_CODE_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

fn invalid_credentials() -> PlannerError {
    PlannerError::Auth {
        endpoint: "account",
        detail: "invalid credentials".to_string(),
    }
}

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    jwt_secret: String,
    auto_confirm: bool,
    hash_cost: u32,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, jwt_secret: impl Into<String>, auto_confirm: bool) -> Self {
        Self {
            store,
            jwt_secret: jwt_secret.into(),
            auto_confirm,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    fn signed_in(&self, profile: &UserProfileDocument) -> Result<AuthOutcome, PlannerError> {
        Ok(AuthOutcome {
            user: Some(User::from(profile)),
            auth_token: Some(generate_token(&self.jwt_secret, &profile.email, &profile.id)?),
            needs_confirmation: false,
        })
    }

    fn awaiting_confirmation(profile: &UserProfileDocument) -> AuthOutcome {
        AuthOutcome {
            user: Some(User::from(profile)),
            auth_token: None,
            needs_confirmation: true,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthOutcome, PlannerError> {
        let email = request.email.trim().to_lowercase();
        let mut problems = Vec::new();
        if !is_valid_email(&email) {
            problems.push("invalid email address".to_string());
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            problems.push(format!(
                "password must have at least {} characters",
                MIN_PASSWORD_LENGTH
            ));
        }
        if !problems.is_empty() {
            return Err(PlannerError::Validation(problems));
        }

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(PlannerError::Conflict(format!("account {}", email)));
        }

        let password = bcrypt::hash(&request.password, self.hash_cost)
            .map_err(|e| PlannerError::Config(format!("password hashing failed: {}", e)))?;
        let username = request
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_username(&email));

        let profile = UserProfileDocument {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            username,
            password,
            email_confirmed: self.auto_confirm,
            confirmation_code: (!self.auto_confirm).then(confirmation_code),
            created_at: bson::DateTime::from_millis(Utc::now().timestamp_millis()),
            last_signin: None,
        };
        self.store.insert(&profile).await?;
        log::info!("Registered account {}", profile.id);

        match &profile.confirmation_code {
            Some(code) => {
                log::info!("Confirmation code for {}: {}", profile.email, code);
                Ok(Self::awaiting_confirmation(&profile))
            }
            None => self.signed_in(&profile),
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthOutcome, PlannerError> {
        let email = request.email.trim().to_lowercase();
        let profile = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !bcrypt::verify(&request.password, &profile.password).unwrap_or(false) {
            log::info!("Failed sign-in for account {}", profile.id);
            return Err(invalid_credentials());
        }
        if !profile.email_confirmed {
            return Ok(Self::awaiting_confirmation(&profile));
        }

        if let Err(err) = self.store.record_signin(&profile.id).await {
            log::warn!("Failed to record sign-in for {}: {}", profile.id, err);
        }
        self.signed_in(&profile)
    }

    pub async fn confirm(&self, request: ConfirmRequest) -> Result<AuthOutcome, PlannerError> {
        let email = request.email.trim().to_lowercase();
        let profile = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("account {}", email)))?;

        if profile.email_confirmed {
            return self.signed_in(&profile);
        }
        let code = request.code.trim().to_uppercase();
        if profile.confirmation_code.as_deref() != Some(code.as_str()) {
            return Err(PlannerError::validation("invalid confirmation code"));
        }

        self.store.mark_confirmed(&profile.id).await?;
        log::info!("Confirmed account {}", profile.id);
        self.signed_in(&profile)
    }

    /// Account behind `user_id`; `None` when signed out or unknown.
    pub async fn current_user(&self, user_id: Option<&str>) -> Result<Option<User>, PlannerError> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_by_id(user_id)
            .await?
            .map(|profile| User::from(&profile)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    fn service(auto_confirm: bool) -> (Arc<InMemoryAccountStore>, AccountService) {
        let store = Arc::new(InMemoryAccountStore::default());
        let service = AccountService::new(store.clone(), "secret", auto_confirm).with_hash_cost(4);
        (store, service)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "hunter22".to_string(),
            name: None,
        }
    }

    #[actix_rt::test]
    async fn test_register_and_login_with_auto_confirm() {
        let (_, service) = service(true);

        let registered = service.register(register_request("Hana@Example.com")).await.unwrap();
        assert!(!registered.needs_confirmation);
        let user = registered.user.unwrap();
        assert_eq!(user.email, "hana@example.com");
        assert_eq!(user.name, "hana");

        let token = registered.auth_token.unwrap();
        assert_eq!(decode_token("secret", &token).unwrap().user_id, user.id);

        let login = service
            .login(LoginRequest {
                email: "hana@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();
        assert!(login.auth_token.is_some());
    }

    #[actix_rt::test]
    async fn test_duplicate_registration_conflicts() {
        let (_, service) = service(true);
        service.register(register_request("hana@example.com")).await.unwrap();

        let again = service.register(register_request("hana@example.com")).await;
        assert!(matches!(again, Err(PlannerError::Conflict(_))));
    }

    #[actix_rt::test]
    async fn test_wrong_password_is_rejected() {
        let (_, service) = service(true);
        service.register(register_request("hana@example.com")).await.unwrap();

        let result = service
            .login(LoginRequest {
                email: "hana@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await;
        assert!(matches!(result, Err(PlannerError::Auth { endpoint: "account", .. })));
    }

    #[actix_rt::test]
    async fn test_confirmation_flow() {
        let (store, service) = service(false);

        let registered = service.register(register_request("hana@example.com")).await.unwrap();
        assert!(registered.needs_confirmation);
        assert!(registered.auth_token.is_none());

        let profile = store.find_by_email("hana@example.com").await.unwrap().unwrap();
        let code = profile.confirmation_code.unwrap();
        assert_eq!(code.len(), CONFIRMATION_CODE_LENGTH);

        let login = service
            .login(LoginRequest {
                email: "hana@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();
        assert!(login.needs_confirmation);

        let wrong = service
            .confirm(ConfirmRequest {
                email: "hana@example.com".to_string(),
                code: "WRONG-CODE".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(PlannerError::Validation(_))));

        let confirmed = service
            .confirm(ConfirmRequest {
                email: "hana@example.com".to_string(),
                code: code.to_lowercase(),
            })
            .await
            .unwrap();
        assert!(confirmed.auth_token.is_some());
        assert!(store.find_by_email("hana@example.com").await.unwrap().unwrap().email_confirmed);
    }

    #[actix_rt::test]
    async fn test_current_user() {
        let (_, service) = service(true);
        assert!(service.current_user(None).await.unwrap().is_none());

        let user = service
            .register(register_request("hana@example.com"))
            .await
            .unwrap()
            .user
            .unwrap();
        assert_eq!(service.current_user(Some(user.id.as_str())).await.unwrap(), Some(user));
        assert!(service.current_user(Some("nobody")).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_invalid_registration_lists_problems() {
        let (_, service) = service(true);
        let result = service
            .register(RegisterRequest {
                email: "not-an-email".to_string(),
                password: "123".to_string(),
                name: None,
            })
            .await;
        assert!(matches!(result, Err(PlannerError::Validation(p)) if p.len() == 2));
    }
}
