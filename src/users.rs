use crate::database::Database;
use crate::errors::{Result, WalletEngineError};
use crate::models::User;
use crate::security_middleware::auth::{generate_token, Claims};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use std::sync::Arc;
use tracing::info;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WalletEngineError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User accounts exist only to the extent the ledger needs them: each user
/// owns exactly one wallet, created together with the account.
pub struct UserService {
    db: Arc<Database>,
    jwt_secret: String,
    token_ttl_hours: i64,
    default_currency: String,
}

impl UserService {
    pub fn new(
        db: Arc<Database>,
        jwt_secret: String,
        token_ttl_hours: i64,
        default_currency: String,
    ) -> Self {
        UserService {
            db,
            jwt_secret,
            token_ttl_hours,
            default_currency,
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);

        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(WalletEngineError::EmailTaken);
        }

        let password_hash = hash_password(password)?;

        let (user, wallet) = self
            .db
            .create_user_with_wallet(name.trim(), &email, &password_hash, &self.default_currency)
            .await?;

        info!(user_id = user.id, wallet_id = wallet.id, "User registered");

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let email = normalize_email(email);

        let user = self
            .db
            .get_user_by_email(&email)
            .await?
            .ok_or(WalletEngineError::Unauthorized)?;

        if !verify_password(password, &user.password_hash) {
            return Err(WalletEngineError::Unauthorized);
        }

        let token = generate_token(&self.jwt_secret, user.id, &user.email, self.token_ttl_hours)?;

        Ok((user, token))
    }

    /// Issue a fresh token for an already-authenticated caller.
    pub fn refresh(&self, claims: &Claims) -> Result<String> {
        generate_token(
            &self.jwt_secret,
            claims.user_id,
            &claims.email,
            self.token_ttl_hours,
        )
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| WalletEngineError::NotFound(format!("user {}", user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();

        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("password123").unwrap();
        let b = hash_password("password123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("password123", "not-a-phc-string"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }
}
