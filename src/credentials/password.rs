//! Password generation.
//!
//! Passwords are drawn from the OS CSPRNG and always contain at least one
//! uppercase letter, one lowercase letter, one digit and one symbol. The
//! symbol alphabet leaves out characters that break connection strings or
//! SQL literal quoting (`/ @ " ' \ % : ; , ` ` and whitespace), which RDS and
//! libpq-style URLs reject or mangle.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::errors::{CredplaneError, Result};
use crate::secrets::SecretString;

pub const MIN_PASSWORD_LENGTH: usize = 16;
pub const MAX_PASSWORD_LENGTH: usize = 128;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Symbols accepted by PostgreSQL password literals and safe in connection URLs.
pub const POSTGRES_SYMBOLS: &str = "!#$^&*()-_=+[]{}<>?~.";

const FORBIDDEN_SYMBOLS: &str = "/@\"'\\%:;,`";

/// Length and alphabet rules for generated passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    length: usize,
    symbols: Vec<u8>,
}

impl PasswordPolicy {
    /// Build a policy, rejecting lengths below 16 and unsafe symbol alphabets.
    pub fn new(length: usize, symbols: &str) -> Result<Self> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(CredplaneError::validation_field(
                format!(
                    "password length must be between {} and {}",
                    MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
                ),
                "password_length",
            ));
        }
        if symbols.is_empty() {
            return Err(CredplaneError::validation_field(
                "symbol alphabet cannot be empty",
                "symbols",
            ));
        }
        if let Some(bad) = symbols
            .chars()
            .find(|c| !c.is_ascii_punctuation() || FORBIDDEN_SYMBOLS.contains(*c))
        {
            return Err(CredplaneError::validation_field(
                format!("symbol '{}' is not allowed in generated passwords", bad.escape_default()),
                "symbols",
            ));
        }

        let mut symbols: Vec<u8> = symbols.bytes().collect();
        symbols.sort_unstable();
        symbols.dedup();
        Ok(Self { length, symbols })
    }

    /// PostgreSQL policy with the given length.
    pub fn postgres(length: usize) -> Result<Self> {
        Self::new(length, POSTGRES_SYMBOLS)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// True if `password` has the policy length, covers all four classes and
    /// uses no character outside the alphabet.
    pub fn is_compliant(&self, password: &str) -> bool {
        let bytes = password.as_bytes();
        bytes.len() == self.length
            && bytes.iter().any(|b| UPPER.contains(b))
            && bytes.iter().any(|b| LOWER.contains(b))
            && bytes.iter().any(|b| DIGITS.contains(b))
            && bytes.iter().any(|b| self.symbols.contains(b))
            && bytes.iter().all(|b| {
                UPPER.contains(b)
                    || LOWER.contains(b)
                    || DIGITS.contains(b)
                    || self.symbols.contains(b)
            })
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { length: 24, symbols: POSTGRES_SYMBOLS.bytes().collect() }
    }
}

/// Generates policy-compliant passwords from the OS random source.
#[derive(Debug, Clone, Default)]
pub struct PasswordGenerator {
    policy: PasswordPolicy,
}

impl PasswordGenerator {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Produce a fresh password.
    pub fn generate(&self) -> SecretString {
        let mut rng = OsRng;
        let classes: [&[u8]; 4] = [UPPER, LOWER, DIGITS, &self.policy.symbols];

        let mut bytes: Vec<u8> = Vec::with_capacity(self.policy.length);
        for class in classes {
            bytes.push(class[rng.gen_range(0..class.len())]);
        }

        let alphabet: Vec<u8> = classes.concat();
        while bytes.len() < self.policy.length {
            bytes.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        bytes.shuffle(&mut rng);

        // alphabet is ASCII-only
        SecretString::new(bytes.into_iter().map(char::from).collect::<String>())
    }
}
