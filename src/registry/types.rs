//! Registry identifiers, provider tags and the canonical lookup result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A normalized product registration number (13 ASCII digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryNumber(String);

/// Why an identifier failed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryNumberError {
    #[error("registry number is empty")]
    Empty,

    #[error("registry number contains invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("registry number must have {expected} digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

impl RegistryNumber {
    /// Number of digits in a registration number.
    pub const DIGITS: usize = 13;

    /// Normalize and validate. Dots, dashes, slashes and whitespace are dropped.
    pub fn parse(raw: &str) -> Result<Self, RegistryNumberError> {
        let mut digits = String::with_capacity(Self::DIGITS);
        for c in raw.chars() {
            match c {
                '0'..='9' => digits.push(c),
                '.' | '-' | '/' => {}
                c if c.is_whitespace() => {}
                other => return Err(RegistryNumberError::InvalidCharacter(other)),
            }
        }

        if digits.is_empty() {
            return Err(RegistryNumberError::Empty);
        }
        if digits.len() != Self::DIGITS {
            return Err(RegistryNumberError::WrongLength {
                expected: Self::DIGITS,
                actual: digits.len(),
            });
        }

        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RegistryNumber {
    type Err = RegistryNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegistryNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Paid accelerator with its own schema.
    Accelerator,
    /// Public registry fallback.
    PublicRegistry,
    /// Decided locally without a network call.
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Accelerator => "accelerator",
            ProviderKind::PublicRegistry => "public_registry",
            ProviderKind::Local => "local",
        }
    }
}

/// Canonical registration situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    Active,
    Expired,
    Cancelled,
    Suspended,
    NotFound,
    InvalidFormat,
    /// The provider used a label we do not recognize.
    Unknown,
}

impl Situation {
    /// Map a provider label (either backend, any case, with or without accents).
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' | 'à' | 'ã' | 'â' => 'a',
                'é' | 'ê' => 'e',
                'í' => 'i',
                'ó' | 'õ' | 'ô' => 'o',
                'ú' => 'u',
                other => other,
            })
            .collect();

        match normalized.as_str() {
            "ativo" | "valido" | "vigente" | "active" | "valid" => Situation::Active,
            "vencido" | "expirado" | "caduco" | "expired" => Situation::Expired,
            "cancelado" | "cancelled" | "canceled" => Situation::Cancelled,
            "suspenso" | "suspended" => Situation::Suspended,
            _ => Situation::Unknown,
        }
    }
}

/// Provider-agnostic record, produced by each provider's normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistryRecord {
    pub situation: Option<Situation>,
    pub product_name: Option<String>,
    pub holder_name: Option<String>,
    pub expires_on: Option<NaiveDate>,
    pub risk_class: Option<String>,
}

/// Answer of a single provider call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAnswer {
    Found(RegistryRecord),
    /// Clean negative: the provider has nothing for this identifier.
    NoData,
}

/// Normalized outcome of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Normalized identifier, or the raw input when it failed validation.
    pub identifier: String,
    pub valid: bool,
    pub situation: Situation,
    pub product_name: Option<String>,
    pub holder_name: Option<String>,
    pub expires_on: Option<NaiveDate>,
    pub risk_class: Option<String>,
    /// Backend that produced the answer, kept for audit.
    pub provider: ProviderKind,
    pub checked_at: DateTime<Utc>,
}

impl ProviderResult {
    /// Build from a provider record. A past expiry date overrides an "active" label.
    pub fn from_record(number: &RegistryNumber, provider: ProviderKind, record: RegistryRecord) -> Self {
        let now = Utc::now();
        let mut situation = record.situation.unwrap_or(Situation::Unknown);
        if situation == Situation::Active {
            if let Some(expiry) = record.expires_on {
                if expiry < now.date_naive() {
                    situation = Situation::Expired;
                }
            }
        }

        Self {
            identifier: number.to_string(),
            valid: situation == Situation::Active,
            situation,
            product_name: record.product_name,
            holder_name: record.holder_name,
            expires_on: record.expires_on,
            risk_class: record.risk_class,
            provider,
            checked_at: now,
        }
    }

    pub fn not_found(number: &RegistryNumber, provider: ProviderKind) -> Self {
        Self::negative(number.to_string(), Situation::NotFound, provider)
    }

    pub fn invalid_format(raw: &str) -> Self {
        Self::negative(raw.to_string(), Situation::InvalidFormat, ProviderKind::Local)
    }

    fn negative(identifier: String, situation: Situation, provider: ProviderKind) -> Self {
        Self {
            identifier,
            valid: false,
            situation,
            product_name: None,
            holder_name: None,
            expires_on: None,
            risk_class: None,
            provider,
            checked_at: Utc::now(),
        }
    }
}

/// Parse the date formats both providers use (`YYYY-MM-DD`, `DD/MM/YYYY`).
pub fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_registry_number_normalization() {
        let n = RegistryNumber::parse("1.0123.4567.890-1").unwrap();
        assert_eq!(n.as_str(), "1012345678901");
        assert_eq!("1012345678901".parse::<RegistryNumber>().unwrap(), n);
    }

    #[test]
    fn test_registry_number_rejections() {
        assert_eq!(RegistryNumber::parse(""), Err(RegistryNumberError::Empty));
        assert_eq!(RegistryNumber::parse(" - "), Err(RegistryNumberError::Empty));
        assert_eq!(
            RegistryNumber::parse("10123A5678901"),
            Err(RegistryNumberError::InvalidCharacter('A'))
        );
        assert_eq!(
            RegistryNumber::parse("12345"),
            Err(RegistryNumberError::WrongLength { expected: 13, actual: 5 })
        );
    }

    #[test]
    fn test_situation_labels() {
        assert_eq!(Situation::from_label("Válido"), Situation::Active);
        assert_eq!(Situation::from_label("VALIDO"), Situation::Active);
        assert_eq!(Situation::from_label(" Vencido "), Situation::Expired);
        assert_eq!(Situation::from_label("CANCELADO"), Situation::Cancelled);
        assert_eq!(Situation::from_label("em análise"), Situation::Unknown);
    }

    #[test]
    fn test_past_expiry_overrides_active_label() {
        let number = RegistryNumber::parse("1012345678901").unwrap();
        let record = RegistryRecord {
            situation: Some(Situation::Active),
            expires_on: Some(Utc::now().date_naive() - Duration::days(1)),
            ..Default::default()
        };
        let result = ProviderResult::from_record(&number, ProviderKind::PublicRegistry, record);
        assert_eq!(result.situation, Situation::Expired);
        assert!(!result.valid);
    }

    #[test]
    fn test_parse_provider_date() {
        let expected = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        assert_eq!(parse_provider_date("2030-05-01"), Some(expected));
        assert_eq!(parse_provider_date("01/05/2030"), Some(expected));
        assert_eq!(parse_provider_date("2030-05-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_provider_date("soon"), None);
    }
}
