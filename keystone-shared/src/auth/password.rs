//! Password hashing with Argon2id
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=65536,t=3,p=4$...`) so the
//! parameters travel with the hash and can be raised later without breaking
//! existing accounts; [`needs_rehash`] tells the login flow when to upgrade.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, ParamsBuilder, Version,
};

/// Memory cost in KiB (64 MiB)
const M_COST: u32 = 65536;
const T_COST: u32 = 3;
const P_COST: u32 = 4;

/// Upper bound on accepted password length, to cap hashing work
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

fn params() -> Result<Params, PasswordError> {
    ParamsBuilder::new()
        .m_cost(M_COST)
        .t_cost(T_COST)
        .p_cost(P_COST)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))
}

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params()?);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Checks a password against a stored PHC hash in constant time.
///
/// Returns `Ok(false)` for a wrong password and `Err` only when the stored
/// hash itself is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// True when a stored hash was produced with weaker parameters than the
/// current ones.
pub fn needs_rehash(hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return true;
    };

    match Params::try_from(&parsed) {
        Ok(p) => p.m_cost() < M_COST || p.t_cost() < T_COST || p.p_cost() < P_COST,
        Err(_) => true,
    }
}

/// Password policy: 8-128 characters with upper and lower case letters, a
/// digit and a symbol. The error names the first rule that failed.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let len = password.chars().count();

    if len < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LEN
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    if password.chars().all(char::is_alphanumeric) {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_uses_argon2id_parameters() {
        let hash = hash_password("Correct-Horse-9").expect("hash");

        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
        assert!(!needs_rehash(&hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("Same-Password-1").expect("hash");
        let b = hash_password("Same-Password-1").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("Correct-Horse-9").expect("hash");

        assert!(verify_password("Correct-Horse-9", &hash).expect("verify"));
        assert!(!verify_password("correct-horse-9", &hash).expect("verify"));
        assert!(!verify_password("", &hash).expect("verify"));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        let result = verify_password("anything", "not-a-phc-string");
        assert!(matches!(result, Err(PasswordError::InvalidHash(_))));
        assert!(needs_rehash("not-a-phc-string"));
    }

    #[test]
    fn test_weaker_hash_needs_rehash() {
        let weak = Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            ParamsBuilder::new().m_cost(8192).t_cost(1).p_cost(1).build().unwrap(),
        )
        .hash_password(b"Password-1", &SaltString::generate(&mut OsRng))
        .unwrap()
        .to_string();

        assert!(verify_password("Password-1", &weak).unwrap());
        assert!(needs_rehash(&weak));
    }

    #[test]
    fn test_password_strength_rules() {
        assert!(validate_password_strength("Str0ng!Pass").is_ok());

        let cases = [
            ("Sh0rt!", "at least 8"),
            ("alllowercase1!", "uppercase"),
            ("ALLUPPERCASE1!", "lowercase"),
            ("NoDigitsHere!", "digit"),
            ("NoSymbols123", "special"),
        ];
        for (password, expected) in cases {
            let err = validate_password_strength(password).unwrap_err();
            assert!(err.contains(expected), "{} -> {}", password, err);
        }

        let long = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LEN));
        assert!(validate_password_strength(&long).unwrap_err().contains("at most"));
    }
}
