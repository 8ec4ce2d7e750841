//! IMEI normalization and validation.
//!
//! IMEIs are the join key between hardware and rows, so every entry point
//! (REST bodies, CSV files, QR payloads, the admin CLI) funnels through
//! [`normalize_imei`] before touching the database.

use thiserror::Error;

/// Number of digits in an IMEI (14 digit body plus Luhn check digit).
pub const IMEI_LENGTH: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImeiError {
    #[error("IMEI is empty")]
    Empty,
    #[error("IMEI must contain only digits, found '{0}'")]
    InvalidCharacter(char),
    #[error("IMEI must be 15 digits, got {0}")]
    WrongLength(usize),
    #[error("IMEI check digit does not match")]
    BadCheckDigit,
}

/// Strips the separators people type or print (spaces, dashes, slashes) and
/// checks that exactly 15 digits remain.
pub fn normalize_imei(raw: &str) -> Result<String, ImeiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ImeiError::Empty);
    }

    let mut digits = String::with_capacity(IMEI_LENGTH);
    for ch in trimmed.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '/' | '.' => continue,
            other => return Err(ImeiError::InvalidCharacter(other)),
        }
    }

    if digits.len() != IMEI_LENGTH {
        return Err(ImeiError::WrongLength(digits.len()));
    }
    Ok(digits)
}

/// Like [`normalize_imei`], additionally requiring a valid Luhn check digit.
pub fn normalize_checked_imei(raw: &str) -> Result<String, ImeiError> {
    let digits = normalize_imei(raw)?;
    if !luhn_valid(&digits) {
        return Err(ImeiError::BadCheckDigit);
    }
    Ok(digits)
}

/// Luhn checksum over an all-digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, ch) in digits.chars().rev().enumerate() {
        let Some(mut d) = ch.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Last six digits, used to build default device names.
pub fn imei_suffix(imei: &str) -> &str {
    let start = imei.len().saturating_sub(6);
    &imei[start..]
}
