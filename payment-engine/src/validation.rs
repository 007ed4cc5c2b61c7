//! Request types and fail-fast input validation
//!
//! Everything here runs before the ledger is touched.

use crate::{Error, Result};
use regex::Regex;
use risk_engine::GeoPoint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wallet_ledger::{AccountId, VendorId};

/// Minimum trimmed length of a display name
pub const MIN_NAME_LENGTH: usize = 2;

/// Online payment submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlinePaymentRequest {
    /// Paying account
    pub payer_id: String,
    /// Receiving vendor
    pub vendor_id: i64,
    /// Amount (> 0)
    pub amount: Decimal,
    /// Payer latitude
    pub latitude: f64,
    /// Payer longitude
    pub longitude: f64,
}

/// Offline payment submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflinePaymentRequest {
    /// Paying account
    pub payer_id: String,
    /// Receiving vendor
    pub vendor_id: i64,
    /// Amount (> 0)
    pub amount: Decimal,
    /// Payer latitude
    pub latitude: f64,
    /// Payer longitude
    pub longitude: f64,
    /// Offline authorisation code
    pub code: String,
}

/// Fields shared by both payment modes, after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    /// Paying account
    pub payer_id: AccountId,
    /// Receiving vendor
    pub vendor_id: VendorId,
    /// Amount (> 0)
    pub amount: Decimal,
    /// Payer location
    pub location: GeoPoint,
}

fn validate_common(
    payer_id: &str,
    vendor_id: i64,
    amount: Decimal,
    latitude: f64,
    longitude: f64,
) -> Result<ValidatedPayment> {
    if payer_id.trim().is_empty() {
        return Err(Error::invalid("User ID cannot be empty"));
    }
    let vendor_id = validate_vendor_id(vendor_id)?;
    validate_amount(amount)?;
    let location = GeoPoint::new(latitude, longitude)?;
    Ok(ValidatedPayment {
        payer_id: AccountId::new(payer_id.trim()),
        vendor_id,
        amount,
        location,
    })
}

impl OnlinePaymentRequest {
    /// Check presence and ranges
    pub fn validate(&self) -> Result<ValidatedPayment> {
        validate_common(
            &self.payer_id,
            self.vendor_id,
            self.amount,
            self.latitude,
            self.longitude,
        )
    }
}

impl OfflinePaymentRequest {
    /// Check presence and ranges, returning the trimmed code alongside
    pub fn validate(&self) -> Result<(ValidatedPayment, String)> {
        let payment = validate_common(
            &self.payer_id,
            self.vendor_id,
            self.amount,
            self.latitude,
            self.longitude,
        )?;
        let code = self.code.trim();
        if code.is_empty() {
            return Err(Error::invalid("Offline code cannot be empty"));
        }
        Ok((payment, code.to_string()))
    }
}

/// Amount must be strictly positive
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid("Amount must be positive"));
    }
    Ok(())
}

/// Vendor ids are positive integers
pub fn validate_vendor_id(vendor_id: i64) -> Result<VendorId> {
    if vendor_id <= 0 {
        return Err(Error::invalid("Vendor ID must be positive"));
    }
    Ok(VendorId::new(vendor_id))
}

/// Name and email rules for registration
#[derive(Debug, Clone)]
pub struct InputValidator {
    email_regex: Regex,
}

impl InputValidator {
    /// Compile the validator
    pub fn new() -> Result<Self> {
        let email_regex = Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .map_err(|e| Error::Config(format!("email pattern: {}", e)))?;
        Ok(Self { email_regex })
    }

    /// Trimmed name of at least [`MIN_NAME_LENGTH`] characters
    pub fn name(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.chars().count() < MIN_NAME_LENGTH {
            return Err(Error::invalid(format!(
                "Name must be at least {} characters",
                MIN_NAME_LENGTH
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Syntactically valid email
    pub fn email(&self, email: &str) -> Result<String> {
        let trimmed = email.trim();
        if !self.email_regex.is_match(trimmed) {
            return Err(Error::invalid("Invalid email format"));
        }
        Ok(trimmed.to_string())
    }
}
