//! User accounts, kept as documents in the reserved `users` collection.

use crate::auth::password::{hash_password, verify_password};
use crate::config::{CollectionSpec, UniqueKey};
use crate::error::{AppError, StoreError};
use crate::query::{DateRangeMode, QueryBuilder};
use crate::store::{Document, DocumentStore, Page};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub const USERS_COLLECTION: &str = "users";
const MIN_PASSWORD_LEN: usize = 8;

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{3,64}$").expect("static regex"))
}

pub fn users_collection() -> CollectionSpec {
    CollectionSpec {
        name: USERS_COLLECTION.to_string(),
        unique_keys: vec![UniqueKey::new(vec!["username".into()])],
    }
}

/// Persisted account fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredUser {
    username: String,
    password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    scopes: Vec<String>,
}

/// An account as loaded from the store.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub disabled: bool,
    /// Scopes the account may request.
    pub scopes: Vec<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    password_hash: String,
}

/// What the API returns for an account; never carries the password hash.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub disabled: bool,
    pub scopes: Vec<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        UserView {
            id: u.id,
            username: u.username.clone(),
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            disabled: u.disabled,
            scopes: u.scopes.clone(),
            created: u.created,
            modified: u.modified,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Self-service changes. Scopes and the disabled flag are not part of it.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn decode_user(doc: Document) -> Result<User, AppError> {
    let stored: StoredUser = serde_json::from_value(Value::Object(doc.body)).map_err(|e| {
        AppError::Store(StoreError::Corrupt {
            collection: USERS_COLLECTION.to_string(),
            message: e.to_string(),
        })
    })?;
    Ok(User {
        id: doc.id,
        username: stored.username,
        full_name: stored.full_name,
        email: stored.email,
        disabled: stored.disabled,
        scopes: stored.scopes,
        created: doc.created,
        modified: doc.modified,
        password_hash: stored.password_hash,
    })
}

fn to_body(stored: &StoredUser) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(stored) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(_) => Err(AppError::Internal("user record is not an object".into())),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn check_email(email: &Option<String>) -> Result<(), AppError> {
    match email {
        Some(e) if !e.contains('@') || e.len() < 3 => Err(AppError::Validation("email must be a valid email".into())),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
    default_scopes: Vec<String>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, default_scopes: Vec<String>) -> Self {
        UserService { store, default_scopes }
    }

    pub async fn ensure_collection(&self) -> Result<(), AppError> {
        Ok(self.store.ensure_collection(&users_collection()).await?)
    }

    pub async fn find(&self, username: &str) -> Result<Option<User>, AppError> {
        let query = QueryBuilder::new(DateRangeMode::OpenEnded)
            .eq("username", Some(username))
            .build();
        let docs = self.store.find(USERS_COLLECTION, &query, Page::new(Some(1), None)).await?;
        docs.into_iter().next().map(decode_user).transpose()
    }

    async fn insert(&self, stored: StoredUser) -> Result<User, AppError> {
        let id = self.store.insert_one(USERS_COLLECTION, to_body(&stored)?).await?;
        let doc = self
            .store
            .find_one(USERS_COLLECTION, id)
            .await?
            .ok_or_else(|| AppError::AddFailed(USERS_COLLECTION.to_string()))?;
        decode_user(doc)
    }

    /// New enabled account permitted the default scopes.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        let username = req.username.trim();
        if !username_re().is_match(username) {
            return Err(AppError::Validation(
                "username must be 3-64 characters of letters, digits, '_', '.', '-'".into(),
            ));
        }
        check_password(&req.password)?;
        check_email(&req.email)?;
        let user = self
            .insert(StoredUser {
                username: username.to_string(),
                password_hash: hash_password(&req.password)?,
                full_name: req.full_name,
                email: req.email,
                disabled: false,
                scopes: self.default_scopes.clone(),
            })
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Conflict(format!("username {} is taken", username)),
                other => other,
            })?;
        tracing::info!(username = %user.username, "user registered");
        Ok(user)
    }

    /// Check a username/password pair. Unknown user and wrong password look the same.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let user = self.find(username).await?.ok_or(AppError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            tracing::debug!(username, "password mismatch");
            return Err(AppError::InvalidCredentials);
        }
        if user.disabled {
            return Err(AppError::InactiveAccount(user.username));
        }
        Ok(user)
    }

    /// The account behind a token subject; missing or disabled accounts are inactive.
    pub async fn active(&self, username: &str) -> Result<User, AppError> {
        match self.find(username).await? {
            Some(user) if !user.disabled => Ok(user),
            _ => Err(AppError::InactiveAccount(username.to_string())),
        }
    }

    /// Apply `patch` to the caller's own record, addressed by id.
    pub async fn update_self(&self, user: &User, patch: UserPatch) -> Result<User, AppError> {
        let username = user.username.as_str();
        let mut changes = Map::new();
        if let Some(password) = patch.password {
            check_password(&password)?;
            changes.insert("password_hash".into(), Value::String(hash_password(&password)?));
        }
        if let Some(full_name) = patch.full_name {
            changes.insert("full_name".into(), Value::String(full_name));
        }
        if patch.email.is_some() {
            check_email(&patch.email)?;
            changes.insert("email".into(), patch.email.map(Value::String).unwrap_or(Value::Null));
        }
        let doc = self
            .store
            .update_one(USERS_COLLECTION, user.id, changes)
            .await?
            .ok_or_else(|| AppError::InactiveAccount(username.to_string()))?;
        tracing::info!(username, "user updated own account");
        decode_user(doc)
    }

    pub async fn delete_self(&self, user: &User) -> Result<(), AppError> {
        let username = user.username.as_str();
        if !self.store.delete_one(USERS_COLLECTION, user.id).await? {
            return Err(AppError::InactiveAccount(username.to_string()));
        }
        tracing::info!(username, "user deleted own account");
        Ok(())
    }

    /// Enable or disable an account.
    pub async fn set_disabled(&self, username: &str, disabled: bool) -> Result<User, AppError> {
        let user = self
            .find(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", username)))?;
        let mut changes = Map::new();
        changes.insert("disabled".into(), Value::Bool(disabled));
        let doc = self
            .store
            .update_one(USERS_COLLECTION, user.id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", username)))?;
        decode_user(doc)
    }

    /// Create the admin account holding `scopes` unless it already exists.
    pub async fn bootstrap_admin(&self, username: &str, password: &str, scopes: Vec<String>) -> Result<(), AppError> {
        if self.find(username).await?.is_some() {
            tracing::debug!(username, "admin account already present");
            return Ok(());
        }
        check_password(password)?;
        match self
            .insert(StoredUser {
                username: username.to_string(),
                password_hash: hash_password(password)?,
                full_name: None,
                email: None,
                disabled: false,
                scopes,
            })
            .await
        {
            Ok(_) => {
                tracing::info!(username, "admin account created");
                Ok(())
            }
            // another instance won the race
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
