//! Device provisioning from scanned QR codes.
//!
//! Clients decode the QR image themselves and send the text. Labels in the
//! field come in a few shapes, all of which end in a Luhn-checked IMEI:
//!
//! - bare digits, possibly grouped: `35-693803-564380-9`
//! - tagged text: `IMEI:356938035643809`, `sn=42;imei=356938035643809`
//! - a URL with an `imei` query parameter
//! - a JSON object with an `imei` member (string or number)

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use url::Url;

use crate::imei::{ImeiError, imei_suffix, normalize_checked_imei};

static IMEI_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    // At most 15 digits, single separators between them, and no digit right after.
    Regex::new(r"(?i)\bimei\s*[:=]\s*((?:[0-9][ \-]?){0,14}[0-9])(?:[^0-9]|$)")
        .expect("static IMEI token pattern")
});

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{15})(?:\D|$)").expect("static digit run pattern"));

#[derive(Debug, Error, PartialEq)]
pub enum ProvisionError {
    #[error("QR payload is empty")]
    Empty,
    #[error("no IMEI found in QR payload")]
    NoImei,
    #[error(transparent)]
    Imei(#[from] ImeiError),
}

/// Where in the payload the IMEI was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PayloadFormat {
    Digits,
    Token,
    Url,
    Json,
}

/// Which table a provisioned device lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DeviceKind {
    Sensor,
    Power,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Sensor => "sensor",
            DeviceKind::Power => "power",
        }
    }

    /// Name used when the client does not supply one.
    pub fn default_name(&self, imei: &str) -> String {
        format!("{}-{}", self.as_str(), imei_suffix(imei))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImei {
    pub imei: String,
    pub format: PayloadFormat,
}

fn from_json(payload: &str) -> Option<Result<String, ProvisionError>> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let object = value.as_object()?;
    let member = object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("imei"))
        .map(|(_, v)| v);
    Some(match member {
        Some(serde_json::Value::String(s)) => normalize_checked_imei(s).map_err(Into::into),
        Some(serde_json::Value::Number(n)) => normalize_checked_imei(&n.to_string()).map_err(Into::into),
        _ => Err(ProvisionError::NoImei),
    })
}

fn from_url(payload: &str) -> Option<Result<String, ProvisionError>> {
    let url = Url::parse(payload).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }
    let (_, raw) = url
        .query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case("imei"))?;
    Some(normalize_checked_imei(&raw).map_err(Into::into))
}

/// Finds and validates the IMEI carried by a QR payload.
pub fn extract_imei(payload: &str) -> Result<ScannedImei, ProvisionError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(ProvisionError::Empty);
    }

    if payload.starts_with('{') {
        if let Some(result) = from_json(payload) {
            return result.map(|imei| ScannedImei {
                imei,
                format: PayloadFormat::Json,
            });
        }
    }

    if let Some(result) = from_url(payload) {
        return result.map(|imei| ScannedImei {
            imei,
            format: PayloadFormat::Url,
        });
    }

    if let Some(caps) = IMEI_TOKEN.captures(payload) {
        let imei = normalize_checked_imei(&caps[1])?;
        return Ok(ScannedImei {
            imei,
            format: PayloadFormat::Token,
        });
    }

    match normalize_checked_imei(payload) {
        Ok(imei) => Ok(ScannedImei {
            imei,
            format: PayloadFormat::Digits,
        }),
        // Only digits and separators, just the wrong count or check digit.
        Err(e @ (ImeiError::WrongLength(_) | ImeiError::BadCheckDigit)) => Err(e.into()),
        Err(_) => {
            let caps = DIGIT_RUN.captures(payload).ok_or(ProvisionError::NoImei)?;
            let imei = normalize_checked_imei(&caps[1])?;
            Ok(ScannedImei {
                imei,
                format: PayloadFormat::Digits,
            })
        }
    }
}
