//! Credential hashing and verification (bcrypt).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to hash secret: {0}")]
    Hashing(String),

    #[error("bcrypt cost must be between {min} and {max}, got {got}")]
    InvalidCost { min: u32, max: u32, got: u32 },
}

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Salted, deliberately slow one-way hashing of user secrets.
///
/// Holds only the cost factor, so a single instance can be shared freely
/// across concurrent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost {
                min: MIN_COST,
                max: MAX_COST,
                got: cost,
            });
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret into a self-describing digest (algorithm, cost and salt included).
    pub fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        bcrypt::hash(secret, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Compare a secret against a stored digest.
    ///
    /// A mismatch is `false`, never an error. A digest that cannot be parsed is
    /// treated as a mismatch as well.
    pub fn verify(&self, secret: &str, digest: &str) -> bool {
        match bcrypt::verify(secret, digest) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!(error = %e, "stored digest could not be parsed; treating as mismatch");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4).unwrap()
    }

    #[test]
    fn verify_accepts_the_hashed_secret() {
        let h = hasher();
        let digest = h.hash("superadmin").unwrap();
        assert_ne!(digest, "superadmin");
        assert!(h.verify("superadmin", &digest));
    }

    #[test]
    fn verify_rejects_other_secrets() {
        let h = hasher();
        let digest = h.hash("correct horse").unwrap();
        assert!(!h.verify("correct horsf", &digest));
        assert!(!h.verify("", &digest));
    }

    #[test]
    fn hashing_is_salted() {
        let h = hasher();
        let a = h.hash("same secret").unwrap();
        let b = h.hash("same secret").unwrap();
        assert_ne!(a, b);
        assert!(h.verify("same secret", &a));
        assert!(h.verify("same secret", &b));
    }

    #[test]
    fn malformed_digest_is_a_mismatch() {
        assert!(!hasher().verify("anything", "not-a-bcrypt-digest"));
    }

    #[test]
    fn cost_is_bounded() {
        assert!(PasswordHasher::new(3).is_err());
        assert!(PasswordHasher::new(32).is_err());
        assert_eq!(PasswordHasher::default().cost(), bcrypt::DEFAULT_COST);
    }
}
