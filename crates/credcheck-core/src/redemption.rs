//! Single-use redemption codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::UserId;

/// Characters used for generated codes. `I`, `O`, `0` and `1` are left out.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of generated codes.
pub const GENERATED_CODE_LEN: usize = 8;

/// Canonical form of a user-entered code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Generate a random code from [`CODE_ALPHABET`].
#[must_use]
pub fn generate_code() -> String {
    encode_code(uuid::Uuid::new_v4().as_u128())
}

/// Five bits per character from the low end. The low 40 bits of a v4 UUID
/// are all random; the version and variant bits sit higher up.
#[allow(clippy::cast_possible_truncation)]
fn encode_code(bits: u128) -> String {
    (0..GENERATED_CODE_LEN)
        .map(|i| {
            let index = (bits >> (5 * i)) & 0x1f;
            char::from(CODE_ALPHABET[index as usize])
        })
        .collect()
}

/// A code worth a fixed number of regular credits, redeemable once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCode {
    /// Normalized code.
    pub code: String,
    /// Regular credits granted on redemption.
    pub credit_value: i64,
    /// Set once and never cleared.
    pub is_used: bool,
    /// Who redeemed it.
    pub used_by: Option<UserId>,
    /// When it was redeemed.
    pub used_at: Option<DateTime<Utc>>,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

impl RedemptionCode {
    /// Create an unused code.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CodeNotFound`] if the normalized code is empty.
    /// - [`LedgerError::InvalidAmount`] if `credit_value` is not positive.
    pub fn new(code: &str, credit_value: i64, now: DateTime<Utc>) -> Result<Self> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(LedgerError::CodeNotFound { code });
        }
        if credit_value <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "credit value must be positive, got {credit_value}"
            )));
        }
        Ok(Self {
            code,
            credit_value,
            is_used: false,
            used_by: None,
            used_at: None,
            created_at: now,
        })
    }

    /// Mark the code used by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyUsed`] if the code was claimed before.
    pub fn claim(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
        if self.is_used {
            return Err(LedgerError::AlreadyUsed {
                code: self.code.clone(),
            });
        }
        self.is_used = true;
        self.used_by = Some(user_id);
        self.used_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_upper_cased() {
        assert_eq!(normalize_code("  abCd-12 "), "ABCD-12");
        let code = RedemptionCode::new(" welcome10 ", 10, Utc::now()).unwrap();
        assert_eq!(code.code, "WELCOME10");
        assert!(!code.is_used);
    }

    #[test]
    fn empty_or_worthless_codes_are_rejected() {
        assert!(matches!(
            RedemptionCode::new("   ", 10, Utc::now()),
            Err(LedgerError::CodeNotFound { .. })
        ));
        assert!(matches!(
            RedemptionCode::new("FREE", 0, Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn claim_is_one_way() {
        let now = Utc::now();
        let user = UserId::generate();
        let mut code = RedemptionCode::new("ONCE", 5, now).unwrap();

        code.claim(user, now).unwrap();
        assert!(code.is_used);
        assert_eq!(code.used_by, Some(user));

        let err = code.claim(UserId::generate(), now).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyUsed {
                code: "ONCE".into()
            }
        );
        assert_eq!(code.used_by, Some(user));
    }

    #[test]
    fn generated_codes_use_unambiguous_alphabet() {
        for _ in 0..64 {
            let code = generate_code();
            assert_eq!(code.len(), GENERATED_CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert_eq!(normalize_code(&code), code);
        }
    }

    #[test]
    fn encoding_reaches_the_whole_alphabet() {
        assert_eq!(encode_code(0), "AAAAAAAA");
        assert_eq!(encode_code(u128::MAX), "99999999");
        // Index 31 in the seventh slot only.
        assert_eq!(encode_code(0x1f << 30), "AAAAAA9A");
    }

    #[test]
    fn every_position_uses_more_than_half_the_alphabet() {
        let codes: Vec<String> = (0..2000).map(|_| generate_code()).collect();
        for position in 0..GENERATED_CODE_LEN {
            let mut seen = std::collections::HashSet::new();
            for code in &codes {
                seen.insert(code.as_bytes()[position]);
            }
            assert!(
                seen.len() > 16,
                "position {position} drew from {} characters",
                seen.len()
            );
        }
    }
}
