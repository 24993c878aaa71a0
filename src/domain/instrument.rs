use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CloseRtsError, Result};

/// A tradable instrument, keyed everywhere by its exchange code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    /// Minimum price increment
    pub price_step: Decimal,
}

impl Instrument {
    pub fn new(code: impl Into<String>, price_step: Decimal) -> Self {
        Self {
            code: code.into(),
            price_step,
        }
    }

    /// Round a price to the nearest multiple of the price step
    pub fn shrink_price(&self, price: Decimal) -> Decimal {
        if self.price_step <= Decimal::ZERO {
            return price;
        }
        let steps = (price / self.price_step)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        steps * self.price_step
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Order volume per instrument code, fixed at construction
#[derive(Debug, Clone, Default)]
pub struct VolumeTable {
    volumes: HashMap<String, Decimal>,
}

impl VolumeTable {
    /// Build from (code, volume) pairs. Duplicate codes are rejected.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let mut volumes = HashMap::new();
        for (code, volume) in pairs {
            let code = code.into();
            if volumes.insert(code.clone(), volume).is_some() {
                return Err(CloseRtsError::Validation(format!(
                    "duplicate volume entry for {}",
                    code
                )));
            }
        }
        Ok(Self { volumes })
    }

    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.volumes.get(code).copied()
    }

    /// Volume for an instrument under management
    pub fn volume_for(&self, code: &str) -> Result<Decimal> {
        self.get(code)
            .ok_or_else(|| CloseRtsError::UnknownInstrument(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}
