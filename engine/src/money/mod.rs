//! Monetary values and cost layers.
//!
//! CRITICAL: All money values are i64 minor units (cents for USD). Floats
//! never touch money. Negative money cannot be constructed and no operation
//! produces it; cross-currency arithmetic always fails.

mod cost_layer;

pub use cost_layer::{CostLayer, CostLayerError, CostLayers, ValuationMethod};

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Operation would produce negative money: {amount}")]
    NegativeMoney { amount: i64 },

    #[error("Money amount overflow")]
    Overflow,

    #[error("Invalid ISO-4217 currency code: {code}")]
    InvalidCurrency { code: String },

    #[error("Division requires a positive divisor")]
    InvalidDivisor,
}

/// ISO-4217 alpha-3 currency code, always uppercase ASCII.
///
/// Serializes as the plain code string (`"USD"`) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Currency::new(&code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl Currency {
    /// Parse and validate a currency code.
    ///
    /// # Example
    /// ```
    /// use fulfillment_engine_rs::money::Currency;
    ///
    /// let usd = Currency::new("USD").unwrap();
    /// assert_eq!(usd.code(), "USD");
    /// assert!(Currency::new("usd").is_err());
    /// ```
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(MoneyError::InvalidCurrency {
                code: code.to_string(),
            });
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// US dollar, the default tenant currency.
    pub const fn usd() -> Self {
        Self(*b"USD")
    }

    /// The alpha-3 code.
    pub fn code(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Non-negative monetary amount in minor units plus its currency.
///
/// # Example
/// ```
/// use fulfillment_engine_rs::money::{Currency, Money};
///
/// let a = Money::new(150_00, Currency::usd()).unwrap(); // $150.00
/// let b = Money::new(50_00, Currency::usd()).unwrap();
///
/// assert_eq!(a.add(&b).unwrap().amount_minor(), 200_00);
/// assert_eq!(a.subtract(&b).unwrap().amount_minor(), 100_00);
/// assert!(b.subtract(&a).is_err()); // would go negative
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: Currency,
}

impl Money {
    /// Create a monetary value. Rejects negative amounts.
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, MoneyError> {
        if amount_minor < 0 {
            return Err(MoneyError::NegativeMoney {
                amount: amount_minor,
            });
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount_minor: 0,
            currency,
        }
    }

    /// Amount in minor units (cents for USD).
    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    /// Checked addition within one currency.
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    /// Checked subtraction; fails if the result would be negative.
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        if amount < 0 {
            return Err(MoneyError::NegativeMoney { amount });
        }
        Money::new(amount, self.currency)
    }

    /// Multiply by a non-negative quantity.
    pub fn multiply(&self, quantity: u64) -> Result<Money, MoneyError> {
        let qty = i64::try_from(quantity).map_err(|_| MoneyError::Overflow)?;
        let amount = self
            .amount_minor
            .checked_mul(qty)
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    /// Integer division by a positive divisor. Truncates toward zero.
    pub fn divide(&self, divisor: u64) -> Result<Money, MoneyError> {
        if divisor == 0 {
            return Err(MoneyError::InvalidDivisor);
        }
        let div = i64::try_from(divisor).map_err(|_| MoneyError::Overflow)?;
        Money::new(self.amount_minor / div, self.currency)
    }

    /// Compare two amounts of the same currency.
    ///
    /// Cross-currency comparison is meaningless and returns
    /// `MoneyError::CurrencyMismatch`.
    pub fn compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.require_same_currency(other)?;
        Ok(self.amount_minor.cmp(&other.amount_minor))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount_minor, self.currency)
    }
}
