//! Stateless HS256 access tokens.

use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    /// Id of the account the token was issued to; a later account reusing the username does not match.
    pub uid: Uuid,
    pub scopes: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl TokenManager {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        TokenManager {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn validation() -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 5;
        v
    }

    pub fn issue(&self, uid: Uuid, username: &str, scopes: Vec<String>) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            uid,
            scopes,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.ttl_secs)).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    /// Claims of a token with a valid signature that has not expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips_claims() {
        let tokens = TokenManager::new("secret", 60);
        let uid = Uuid::new_v4();
        let token = tokens.issue(uid, "alice", vec!["read_devices".into()]).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, uid);
        assert_eq!(claims.scopes, vec!["read_devices".to_string()]);
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let tokens = TokenManager::new("secret", 60);
        let past = Utc::now().timestamp() - 3600;
        let expired = tokens
            .sign(&Claims {
                sub: "alice".into(),
                uid: Uuid::new_v4(),
                scopes: vec![],
                iat: past - 60,
                exp: past,
            })
            .unwrap();
        assert!(matches!(tokens.verify(&expired), Err(AppError::Unauthorized(_))));

        let other = TokenManager::new("another-secret", 60)
            .issue(Uuid::new_v4(), "alice", vec![]).unwrap();
        assert!(matches!(tokens.verify(&other), Err(AppError::Unauthorized(_))));
        assert!(tokens.verify("garbage").is_err());
    }
}
