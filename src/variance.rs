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

//! Variance classification against tolerance bands.
//!
//! The band is `max(tolerance_amount, tolerance_ratio × expected)` and is
//! inclusive at its edge. The status is advisory and never blocks settlement.

use crate::config::SettlementConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarianceStatus {
    Matched,
    WithinTolerance,
    Shortage,
    Excess,
}

impl VarianceStatus {
    /// True when the variance falls outside tolerance and needs a look.
    pub fn needs_review(&self) -> bool {
        matches!(self, VarianceStatus::Shortage | VarianceStatus::Excess)
    }
}

impl fmt::Display for VarianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarianceStatus::Matched => "MATCHED",
            VarianceStatus::WithinTolerance => "WITHIN_TOLERANCE",
            VarianceStatus::Shortage => "SHORTAGE",
            VarianceStatus::Excess => "EXCESS",
        };
        f.write_str(name)
    }
}

pub fn classify(raw_variance: Decimal, expected: Decimal, config: &SettlementConfig) -> VarianceStatus {
    if raw_variance.is_zero() {
        return VarianceStatus::Matched;
    }
    if raw_variance.abs() <= config.tolerance_for(expected) {
        return VarianceStatus::WithinTolerance;
    }
    if raw_variance.is_sign_negative() {
        VarianceStatus::Shortage
    } else {
        VarianceStatus::Excess
    }
}
