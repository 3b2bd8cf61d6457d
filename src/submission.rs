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

//! Dispatch snapshots and collection submissions.
//!
//! Collections follow a state machine driven by the office workflow:
//! - [`Submitted`] → [`Verified`] (via verify)
//! - [`Verified`] → [`Reconciled`] (via reconcile)
//!
//! Inputs may only be amended while [`Submitted`].
//!
//! [`Submitted`]: CollectionStatus::Submitted
//! [`Verified`]: CollectionStatus::Verified
//! [`Reconciled`]: CollectionStatus::Reconciled

use crate::base::{DispatchId, DriverId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stock issued to a driver for one period.
///
/// Owned by dispatch management; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: DispatchId,
    pub driver_id: DriverId,
    pub issued_at: DateTime<Utc>,
    /// Total value of the stock issued.
    pub expected_value: Decimal,
    /// Returnable crates loaded onto the vehicle.
    pub crates_loaded: u32,
}

/// One counted denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationEntry {
    pub note_value: Decimal,
    pub count: u32,
    /// Total as reported by the client, checked against `note_value * count`.
    pub declared_total: Option<Decimal>,
}

impl DenominationEntry {
    pub fn new(note_value: Decimal, count: u32) -> Self {
        Self {
            note_value,
            count,
            declared_total: None,
        }
    }

    /// `note_value × count`, or `None` if the product overflows.
    pub fn value(&self) -> Option<Decimal> {
        self.note_value.checked_mul(Decimal::from(self.count))
    }
}

/// A driver's end-of-day report for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSubmission {
    pub dispatch_id: DispatchId,
    pub driver_id: DriverId,
    pub collected_at: DateTime<Utc>,
    pub denominations: Vec<DenominationEntry>,
    /// Loose coinage not itemised by denomination.
    pub coins: Decimal,
    pub cheque_received: Decimal,
    pub online_received: Decimal,
    pub credit_given: Decimal,
    pub credit_received_cash: Decimal,
    pub credit_received_cheque: Decimal,
    pub bounce_received_cash: Decimal,
    pub bounce_received_cheque: Decimal,
    pub returned_full_crates: u32,
    pub returned_empty_crates: u32,
    /// Expected value as reported with the submission.
    pub expected_cash: Option<Decimal>,
    pub notes: String,
}

impl CollectionSubmission {
    /// Creates an empty submission for `dispatch`; amounts default to zero.
    pub fn for_dispatch(dispatch: &Dispatch, collected_at: DateTime<Utc>) -> Self {
        Self {
            dispatch_id: dispatch.id,
            driver_id: dispatch.driver_id,
            collected_at,
            denominations: Vec::new(),
            coins: Decimal::ZERO,
            cheque_received: Decimal::ZERO,
            online_received: Decimal::ZERO,
            credit_given: Decimal::ZERO,
            credit_received_cash: Decimal::ZERO,
            credit_received_cheque: Decimal::ZERO,
            bounce_received_cash: Decimal::ZERO,
            bounce_received_cheque: Decimal::ZERO,
            returned_full_crates: 0,
            returned_empty_crates: 0,
            expected_cash: Some(dispatch.expected_value),
            notes: String::new(),
        }
    }
}

/// Office workflow status of a stored collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CollectionStatus {
    Submitted,
    Verified,
    Reconciled,
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionStatus::Submitted => "Submitted",
            CollectionStatus::Verified => "Verified",
            CollectionStatus::Reconciled => "Reconciled",
        };
        f.write_str(name)
    }
}
