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

//! Wire format of a driver's collection submission.
//!
//! Counts arrive as signed integers from loosely typed clients and are only
//! accepted once they fit a non-negative `u32`. Monetary amounts are decimal
//! strings; absent amounts default to zero, except `expectedCash`.
//!
//! ```json
//! {
//!   "dispatchId": 12, "driverId": 4, "collectionDate": "2025-03-01T18:30:00Z",
//!   "denominations": [{ "noteValue": "500", "noteCount": 6, "totalValue": "3000" }],
//!   "coins": "14", "totalChequeReceived": "1200", "totalCreditGiven": "300",
//!   "returnedFullCrates": 2, "returnedEmptyCrates": 45,
//!   "expectedCash": "4500", "notes": "two retailers closed"
//! }
//! ```

use crate::base::{DispatchId, DriverId};
use crate::error::{Field, SettlementError};
use crate::submission::{CollectionSubmission, DenominationEntry};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenominationPayload {
    pub note_value: Decimal,
    pub note_count: i64,
    #[serde(default)]
    pub total_value: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionPayload {
    pub dispatch_id: Option<DispatchId>,
    pub driver_id: Option<DriverId>,
    pub collection_date: Option<DateTime<Utc>>,
    pub denominations: Vec<DenominationPayload>,
    pub coins: Option<Decimal>,
    pub total_cheque_received: Option<Decimal>,
    pub total_online_received: Option<Decimal>,
    pub total_credit_given: Option<Decimal>,
    pub credit_received_cash: Option<Decimal>,
    pub credit_received_cheque: Option<Decimal>,
    pub bounce_received_cash: Option<Decimal>,
    pub bounce_received_cheque: Option<Decimal>,
    pub returned_full_crates: Option<i64>,
    pub returned_empty_crates: Option<i64>,
    pub expected_cash: Option<Decimal>,
    pub notes: Option<String>,
}

impl SubmissionPayload {
    /// Validates the payload into a [`CollectionSubmission`].
    ///
    /// `received_at` stamps submissions that carry no collection date.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::MissingField`] - dispatch, driver or `expectedCash` absent.
    /// - [`SettlementError::InvalidCount`] - a count is negative or too large.
    /// - [`SettlementError::NegativeAmount`] - any amount below zero.
    pub fn into_submission(
        self,
        received_at: DateTime<Utc>,
    ) -> Result<CollectionSubmission, SettlementError> {
        let dispatch_id = self
            .dispatch_id
            .ok_or(SettlementError::MissingField(Field::DispatchId))?;
        let driver_id = self
            .driver_id
            .ok_or(SettlementError::MissingField(Field::DriverId))?;
        let expected_cash = self
            .expected_cash
            .ok_or(SettlementError::MissingField(Field::ExpectedCash))?;
        if expected_cash < Decimal::ZERO {
            return Err(SettlementError::NegativeAmount(Field::ExpectedCash));
        }

        let denominations = self
            .denominations
            .into_iter()
            .map(|entry| {
                Ok(DenominationEntry {
                    note_value: entry.note_value,
                    count: to_count(entry.note_count, Field::NoteCount)?,
                    declared_total: entry.total_value,
                })
            })
            .collect::<Result<Vec<_>, SettlementError>>()?;

        Ok(CollectionSubmission {
            dispatch_id,
            driver_id,
            collected_at: self.collection_date.unwrap_or(received_at),
            denominations,
            coins: amount(self.coins, Field::Coins)?,
            cheque_received: amount(self.total_cheque_received, Field::ChequeReceived)?,
            online_received: amount(self.total_online_received, Field::OnlineReceived)?,
            credit_given: amount(self.total_credit_given, Field::CreditGiven)?,
            credit_received_cash: amount(self.credit_received_cash, Field::CreditReceivedCash)?,
            credit_received_cheque: amount(
                self.credit_received_cheque,
                Field::CreditReceivedCheque,
            )?,
            bounce_received_cash: amount(self.bounce_received_cash, Field::BounceReceivedCash)?,
            bounce_received_cheque: amount(
                self.bounce_received_cheque,
                Field::BounceReceivedCheque,
            )?,
            returned_full_crates: to_count(
                self.returned_full_crates.unwrap_or(0),
                Field::ReturnedFullCrates,
            )?,
            returned_empty_crates: to_count(
                self.returned_empty_crates.unwrap_or(0),
                Field::ReturnedEmptyCrates,
            )?,
            expected_cash: Some(expected_cash),
            notes: self.notes.unwrap_or_default(),
        })
    }
}

fn amount(value: Option<Decimal>, field: Field) -> Result<Decimal, SettlementError> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO {
        return Err(SettlementError::NegativeAmount(field));
    }
    Ok(value)
}

fn to_count(value: i64, field: Field) -> Result<u32, SettlementError> {
    u32::try_from(value).map_err(|_| SettlementError::InvalidCount(field))
}
