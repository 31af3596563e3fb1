//! Password hashing with Argon2id and a server-side pepper.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use super::errors::{AuthError, AuthResult};

/// One-way credential hashing.
///
/// Hashes are self-contained PHC strings (algorithm, parameters and a fresh
/// random salt are embedded), so parameters can be raised later without
/// invalidating stored hashes.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
    params: Params,
}

impl PasswordHasher {
    /// Create a hasher with the Argon2id default work factor
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
            params: Params::default(),
        }
    }

    /// Create a hasher with an explicit work factor
    pub fn with_params(pepper: impl Into<String>, params: Params) -> Self {
        Self {
            pepper: pepper.into(),
            params,
        }
    }

    /// Hash `password` with a fresh salt
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let peppered = self.pepper(password);
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon2()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Whether `password` reproduces `hash`. Malformed hashes verify as false.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };
        let peppered = self.pepper(password);

        // Parameters embedded in the hash take precedence over `self.params`
        self.argon2()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn pepper(&self, password: &str) -> String {
        format!("{}{}", password, self.pepper)
    }
}
