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

//! Returnable glass bottle (RGB) crate reconciliation.
//!
//! Every crate loaded either comes back full (unsold) or is sold, and every
//! sold crate should come back empty:
//!
//! ```text
//! loaded ──► returned full
//!        └─► sold ──► returned empty
//!                 └─► missing empty (penalised)
//! ```
//!
//! The penalty is a recommendation; charging it to the driver is done elsewhere.

use crate::reconcile::Inconsistency;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrateReconciliation {
    pub crates_loaded: u32,
    pub returned_full: u32,
    pub returned_empty: u32,
    pub actual_sold: u32,
    pub expected_empties: u32,
    pub missing_empties: u32,
    pub penalty_amount: Decimal,
}

impl CrateReconciliation {
    /// Reconciles crate counts.
    ///
    /// More full crates returned than loaded is clamped to zero sold and
    /// reported as an [`Inconsistency`]; it does not fail.
    pub fn compute(
        crates_loaded: u32,
        returned_full: u32,
        returned_empty: u32,
        penalty_per_crate: Decimal,
    ) -> (Self, Option<Inconsistency>) {
        let warning = (returned_full > crates_loaded).then_some(
            Inconsistency::FullCratesExceedLoaded {
                loaded: crates_loaded,
                returned_full,
            },
        );

        let actual_sold = crates_loaded.saturating_sub(returned_full);
        let expected_empties = actual_sold;
        let missing_empties = expected_empties.saturating_sub(returned_empty);
        let penalty_amount = Decimal::from(missing_empties).saturating_mul(penalty_per_crate);

        let reconciliation = Self {
            crates_loaded,
            returned_full,
            returned_empty,
            actual_sold,
            expected_empties,
            missing_empties,
            penalty_amount,
        };
        (reconciliation, warning)
    }

    /// Empties returned beyond what was sold (crates from earlier periods).
    pub fn surplus_empties(&self) -> u32 {
        self.returned_empty.saturating_sub(self.expected_empties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sold_is_loaded_minus_returned_full() {
        let (rgb, warning) = CrateReconciliation::compute(52, 2, 0, dec!(50));
        assert_eq!(rgb.actual_sold, 50);
        assert_eq!(rgb.returned_full + rgb.actual_sold, rgb.crates_loaded);
        assert!(warning.is_none());
    }

    #[test]
    fn missing_empties_are_penalised() {
        let (rgb, _) = CrateReconciliation::compute(52, 2, 45, dec!(50));
        assert_eq!(rgb.expected_empties, 50);
        assert_eq!(rgb.missing_empties, 5);
        assert_eq!(rgb.penalty_amount, dec!(250));
    }

    #[test]
    fn all_empties_back_means_no_penalty() {
        let (exact, _) = CrateReconciliation::compute(52, 2, 50, dec!(50));
        assert_eq!(exact.missing_empties, 0);
        assert_eq!(exact.penalty_amount, Decimal::ZERO);

        let (surplus, _) = CrateReconciliation::compute(52, 2, 53, dec!(50));
        assert_eq!(surplus.missing_empties, 0);
        assert_eq!(surplus.penalty_amount, Decimal::ZERO);
        assert_eq!(surplus.surplus_empties(), 3);
    }

    #[test]
    fn over_returned_full_is_clamped_and_flagged() {
        let (rgb, warning) = CrateReconciliation::compute(10, 12, 0, dec!(50));
        assert_eq!(rgb.actual_sold, 0);
        assert_eq!(rgb.missing_empties, 0);
        assert_eq!(
            warning,
            Some(Inconsistency::FullCratesExceedLoaded {
                loaded: 10,
                returned_full: 12
            })
        );
    }

    #[test]
    fn no_crates_loaded() {
        let (rgb, warning) = CrateReconciliation::compute(0, 0, 0, dec!(50));
        assert_eq!(rgb.actual_sold, 0);
        assert_eq!(rgb.penalty_amount, Decimal::ZERO);
        assert!(warning.is_none());
    }

    #[test]
    fn penalty_rate_is_configurable() {
        let (rgb, _) = CrateReconciliation::compute(20, 0, 17, dec!(75.50));
        assert_eq!(rgb.penalty_amount, dec!(226.50));
    }
}
