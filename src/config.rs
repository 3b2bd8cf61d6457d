// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Business parameters for variance tolerance and crate penalties.
//!
//! # Example
//!
//! ```
//! use driver_settlement_rs::SettlementConfig;
//! use rust_decimal_macros::dec;
//!
//! let config = SettlementConfig::from_reader(r#"{ "penalty_per_crate": "40" }"#.as_bytes()).unwrap();
//! assert_eq!(config.penalty_per_crate, dec!(40));
//! assert_eq!(config.tolerance_amount, dec!(100));
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Tolerance and penalty parameters.
///
/// These vary per contract or region, so they are never hard-coded in the
/// arithmetic. Missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Absolute variance tolerated regardless of dispatch size.
    pub tolerance_amount: Decimal,
    /// Fraction of the expected value tolerated (0.02 = 2%).
    pub tolerance_ratio: Decimal,
    /// Charge per empty crate not returned.
    pub penalty_per_crate: Decimal,
}

impl SettlementConfig {
    pub const DEFAULT_TOLERANCE_AMOUNT: Decimal = dec!(100);
    pub const DEFAULT_TOLERANCE_RATIO: Decimal = dec!(0.02);
    pub const DEFAULT_PENALTY_PER_CRATE: Decimal = dec!(50);

    /// Parses a JSON document and validates it.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: SettlementConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance_amount < Decimal::ZERO {
            return Err(ConfigError::Invalid("tolerance_amount cannot be negative"));
        }
        if self.tolerance_ratio < Decimal::ZERO || self.tolerance_ratio > Decimal::ONE {
            return Err(ConfigError::Invalid("tolerance_ratio must be between 0 and 1"));
        }
        if self.penalty_per_crate < Decimal::ZERO {
            return Err(ConfigError::Invalid("penalty_per_crate cannot be negative"));
        }
        Ok(())
    }

    /// Largest absolute variance still classed as within tolerance for a
    /// dispatch of `expected` value.
    pub fn tolerance_for(&self, expected: Decimal) -> Decimal {
        self.tolerance_amount.max(self.tolerance_ratio * expected)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            tolerance_amount: Self::DEFAULT_TOLERANCE_AMOUNT,
            tolerance_ratio: Self::DEFAULT_TOLERANCE_RATIO,
            penalty_per_crate: Self::DEFAULT_PENALTY_PER_CRATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_business_values() {
        let config = SettlementConfig::default();
        assert_eq!(config.tolerance_amount, dec!(100));
        assert_eq!(config.tolerance_ratio, dec!(0.02));
        assert_eq!(config.penalty_per_crate, dec!(50));
    }

    #[test]
    fn tolerance_takes_larger_of_absolute_and_ratio() {
        let config = SettlementConfig::default();
        assert_eq!(config.tolerance_for(dec!(5000)), dec!(100));
        assert_eq!(config.tolerance_for(dec!(10000)), dec!(200));
        assert_eq!(config.tolerance_for(Decimal::ZERO), dec!(100));
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let json = r#"{ "tolerance_ratio": "0.05" }"#;
        let config = SettlementConfig::from_reader(json.as_bytes()).unwrap();
        assert_eq!(config.tolerance_ratio, dec!(0.05));
        assert_eq!(config.tolerance_amount, dec!(100));
        assert_eq!(config.penalty_per_crate, dec!(50));
    }

    #[test]
    fn rejects_negative_penalty() {
        let json = r#"{ "penalty_per_crate": "-1" }"#;
        let result = SettlementConfig::from_reader(json.as_bytes());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_ratio_above_one() {
        let json = r#"{ "tolerance_ratio": "1.5" }"#;
        let result = SettlementConfig::from_reader(json.as_bytes());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        let result = SettlementConfig::from_reader("{ not json".as_bytes());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
