use crate::error::{AppError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 2;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The plaintext password.
///
/// # Returns
///
/// A `Result<String>` containing the PHC-encoded hash with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verifies a password against a PHC hash.
///
/// # Arguments
///
/// * `password` - The plaintext password.
/// * `hash` - The stored PHC string; its parameters drive the verification.
///
/// # Returns
///
/// A `Result<bool>` that is `Ok(false)` on mismatch and an error only when
/// `hash` cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok())
}

/// Hashes a random secret nobody knows.
///
/// Logins for unknown accounts verify against it so they take as long as a
/// wrong password for a real account.
pub fn decoy_hash() -> Result<String> {
    let secret = Zeroizing::new(uuid::Uuid::new_v4().to_string());
    hash_password(&secret)
}
