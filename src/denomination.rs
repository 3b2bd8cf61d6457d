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

//! Denomination ledger: turns counted notes and loose coins into a cash subtotal.
//!
//! Any positive face value is accepted since local coinage varies. Entries
//! sharing a face value are merged rather than rejected, so the subtotal does
//! not depend on how the count was split or ordered.
//!
//! # Example
//!
//! ```
//! use driver_settlement_rs::{DenominationEntry, denomination};
//! use rust_decimal_macros::dec;
//!
//! let entries = [
//!     DenominationEntry::new(dec!(500), 3),
//!     DenominationEntry::new(dec!(100), 4),
//!     DenominationEntry::new(dec!(500), 1),
//! ];
//! let cash = denomination::cash_subtotal(&entries, dec!(7.50)).unwrap();
//! assert_eq!(cash, dec!(2407.50));
//! ```

use crate::error::{Field, SettlementError};
use crate::reconcile::Inconsistency;
use crate::submission::DenominationEntry;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Counts per face value after merging duplicates, highest value first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteTally {
    counts: BTreeMap<Decimal, u64>,
}

impl NoteTally {
    /// Merges `entries`, validating every face value.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::InvalidDenomination`] for a zero or negative
    /// face value.
    pub fn from_entries(entries: &[DenominationEntry]) -> Result<Self, SettlementError> {
        let mut counts = BTreeMap::new();
        for entry in entries {
            if entry.note_value <= Decimal::ZERO {
                return Err(SettlementError::InvalidDenomination(entry.note_value));
            }
            *counts.entry(entry.note_value.normalize()).or_insert(0u64) += u64::from(entry.count);
        }
        Ok(Self { counts })
    }

    pub fn count_of(&self, note_value: Decimal) -> u64 {
        self.counts.get(&note_value.normalize()).copied().unwrap_or(0)
    }

    /// Value of all notes, excluding coins.
    ///
    /// # Errors
    ///
    /// [`SettlementError::AmountOverflow`] when the total does not fit in a [`Decimal`].
    pub fn notes_total(&self) -> Result<Decimal, SettlementError> {
        self.counts
            .iter()
            .try_fold(Decimal::ZERO, |total, (value, count)| {
                value
                    .checked_mul(Decimal::from(*count))
                    .and_then(|subtotal| total.checked_add(subtotal))
            })
            .ok_or(SettlementError::AmountOverflow(Field::NoteValue))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Decimal, u64)> + '_ {
        self.counts.iter().rev().map(|(value, count)| (*value, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|count| *count == 0)
    }
}

/// Returns `Σ(note_value × count) + coins`.
///
/// # Errors
///
/// - [`SettlementError::InvalidDenomination`] for a non-positive face value.
/// - [`SettlementError::NegativeAmount`] when `coins` is negative.
/// - [`SettlementError::AmountOverflow`] when the subtotal does not fit in a [`Decimal`].
pub fn cash_subtotal(
    entries: &[DenominationEntry],
    coins: Decimal,
) -> Result<Decimal, SettlementError> {
    if coins < Decimal::ZERO {
        return Err(SettlementError::NegativeAmount(Field::Coins));
    }
    let tally = NoteTally::from_entries(entries)?;
    tally
        .notes_total()?
        .checked_add(coins)
        .ok_or(SettlementError::AmountOverflow(Field::Coins))
}

/// Entries whose declared total disagrees with `note_value × count`.
///
/// The computed value is authoritative; mismatches are reported for review.
pub fn declared_total_mismatches(entries: &[DenominationEntry]) -> Vec<Inconsistency> {
    entries
        .iter()
        .filter_map(|entry| {
            let declared = entry.declared_total?;
            let computed = entry.value()?;
            (declared != computed).then_some(Inconsistency::DenominationTotalMismatch {
                note_value: entry.note_value,
                count: entry.count,
                declared,
                computed,
            })
        })
        .collect()
}
