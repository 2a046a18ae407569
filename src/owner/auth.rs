//! Password hashing and session token generation.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

const TOKEN_LENGTH: usize = 64;

/// Opaque bearer token handed out at login.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct TokenValue(pub String);

impl TokenValue {
    pub fn generate() -> TokenValue {
        let value: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        TokenValue(value)
    }
}

fn argon2_instance() -> Result<Argon2<'static>> {
    if cfg!(feature = "test-fast-hasher") {
        // Weak parameters to keep test suites fast. Never enabled in
        // release builds.
        let params = argon2::Params::new(8, 1, 1, None).map_err(|err| anyhow!("{}", err))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    } else {
        Ok(Argon2::default())
    }
}

pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2_instance()?
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("{}", err))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, target_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(target_hash).map_err(|err| anyhow!("{}", err))?;
    Ok(argon2_instance()?
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
