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

//! Pure reconciliation of one collection against its dispatch.
//!
//! [`reconcile`] chains the denomination ledger, channel settlement, variance
//! classifier and crate reconciler. It reads nothing but its arguments, so
//! the same inputs always produce the same [`Reconciliation`] and it can run
//! in parallel without locks. The driver's cumulative variance depends on
//! submission order and is tracked separately by the engine.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use driver_settlement_rs::{
//!     reconcile, CollectionSubmission, DenominationEntry, Dispatch, DispatchId, DriverId,
//!     SettlementConfig, VarianceStatus,
//! };
//! use rust_decimal_macros::dec;
//!
//! let dispatch = Dispatch {
//!     id: DispatchId(1),
//!     driver_id: DriverId(7),
//!     issued_at: Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap(),
//!     expected_value: dec!(5000),
//!     crates_loaded: 52,
//! };
//! let mut submission = CollectionSubmission::for_dispatch(&dispatch, dispatch.issued_at);
//! submission.denominations = vec![DenominationEntry::new(dec!(500), 8)];
//! submission.online_received = dec!(950);
//! submission.returned_full_crates = 2;
//! submission.returned_empty_crates = 45;
//!
//! let result = reconcile(&dispatch, &submission, &SettlementConfig::default()).unwrap();
//! assert_eq!(result.raw_variance, dec!(-50));
//! assert_eq!(result.variance_status, VarianceStatus::WithinTolerance);
//! assert_eq!(result.crates.penalty_amount, dec!(250));
//! ```

use crate::channel::{self, ChannelAmounts};
use crate::config::SettlementConfig;
use crate::denomination;
use crate::error::{Field, SettlementError};
use crate::rgb::CrateReconciliation;
use crate::submission::{CollectionSubmission, Dispatch};
use crate::variance::{self, VarianceStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Longest accepted free-text note.
pub const MAX_NOTES_LEN: usize = 500;

/// Non-fatal finding recorded for human review.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    /// `returnedFullCrates` exceeds crates loaded; sold was clamped to zero
    #[error("returnedFullCrates ({returned_full}) exceeds crates loaded ({loaded})")]
    FullCratesExceedLoaded { loaded: u32, returned_full: u32 },

    /// Declared denomination total disagrees with `noteValue × noteCount`
    #[error(
        "totalValue {declared} for {count} × {note_value} does not match computed {computed}"
    )]
    DenominationTotalMismatch {
        note_value: Decimal,
        count: u32,
        declared: Decimal,
        computed: Decimal,
    },

    /// Reported `expectedCash` differs from the dispatch's expected value
    #[error("expectedCash {reported} differs from dispatch expected value {dispatch}")]
    ExpectedCashMismatch { dispatch: Decimal, reported: Decimal },
}

impl Inconsistency {
    /// Payload field the finding concerns.
    pub fn field(&self) -> Field {
        match self {
            Inconsistency::FullCratesExceedLoaded { .. } => Field::ReturnedFullCrates,
            Inconsistency::DenominationTotalMismatch { .. } => Field::NoteCount,
            Inconsistency::ExpectedCashMismatch { .. } => Field::ExpectedCash,
        }
    }
}

/// Financial and crate reconciliation of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub expected_cash: Decimal,
    pub cash_subtotal: Decimal,
    pub total_received: Decimal,
    pub credit_given: Decimal,
    pub raw_variance: Decimal,
    pub variance_percentage: Option<Decimal>,
    pub variance_status: VarianceStatus,
    /// Prior-period credit recovered (cash + cheque); not part of the variance.
    pub credit_recovered: Decimal,
    /// Bounced cheques recovered (cash + cheque); not part of the variance.
    pub bounce_recovered: Decimal,
    pub crates: CrateReconciliation,
    pub warnings: Vec<Inconsistency>,
}

impl Reconciliation {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Reconciles `submission` against `dispatch`.
///
/// # Errors
///
/// - [`SettlementError::DispatchMismatch`] - submission is for another dispatch.
/// - [`SettlementError::DriverMismatch`] - dispatch was issued to another driver.
/// - [`SettlementError::MissingField`] - `expectedCash` absent.
/// - [`SettlementError::NegativeAmount`] - any amount below zero.
/// - [`SettlementError::InvalidDenomination`] - non-positive face value.
/// - [`SettlementError::NoAmountsReported`] - every channel total is zero.
/// - [`SettlementError::NotesTooLong`] - notes exceed [`MAX_NOTES_LEN`].
/// - [`SettlementError::AmountOverflow`] - amounts sum past [`Decimal::MAX`].
pub fn reconcile(
    dispatch: &Dispatch,
    submission: &CollectionSubmission,
    config: &SettlementConfig,
) -> Result<Reconciliation, SettlementError> {
    check_references(dispatch, submission)?;
    check_recoveries(submission)?;
    if submission.notes.chars().count() > MAX_NOTES_LEN {
        return Err(SettlementError::NotesTooLong { max: MAX_NOTES_LEN });
    }

    let cash_subtotal = denomination::cash_subtotal(&submission.denominations, submission.coins)?;
    let amounts = ChannelAmounts {
        cash: cash_subtotal,
        cheque: submission.cheque_received,
        online: submission.online_received,
        credit_given: submission.credit_given,
    };
    let settlement = channel::settle(&amounts, submission.expected_cash)?;
    if amounts.is_zero() {
        return Err(SettlementError::NoAmountsReported);
    }

    // settle() has already rejected a missing expected value
    let expected_cash = submission.expected_cash.unwrap_or(dispatch.expected_value);
    let variance_status = variance::classify(settlement.raw_variance, expected_cash, config);

    let credit_recovered = submission
        .credit_received_cash
        .checked_add(submission.credit_received_cheque)
        .ok_or(SettlementError::AmountOverflow(Field::CreditReceivedCheque))?;
    let bounce_recovered = submission
        .bounce_received_cash
        .checked_add(submission.bounce_received_cheque)
        .ok_or(SettlementError::AmountOverflow(Field::BounceReceivedCheque))?;

    let mut warnings = denomination::declared_total_mismatches(&submission.denominations);
    let (crates, crate_warning) = CrateReconciliation::compute(
        dispatch.crates_loaded,
        submission.returned_full_crates,
        submission.returned_empty_crates,
        config.penalty_per_crate,
    );
    warnings.extend(crate_warning);
    if expected_cash != dispatch.expected_value {
        warnings.push(Inconsistency::ExpectedCashMismatch {
            dispatch: dispatch.expected_value,
            reported: expected_cash,
        });
    }
    for warning in &warnings {
        warn!(dispatch = %dispatch.id, field = %warning.field(), "{warning}");
    }

    Ok(Reconciliation {
        expected_cash,
        cash_subtotal,
        total_received: settlement.total_received,
        credit_given: submission.credit_given,
        raw_variance: settlement.raw_variance,
        variance_percentage: channel::variance_percentage(settlement.raw_variance, expected_cash),
        variance_status,
        credit_recovered,
        bounce_recovered,
        crates,
        warnings,
    })
}

fn check_references(
    dispatch: &Dispatch,
    submission: &CollectionSubmission,
) -> Result<(), SettlementError> {
    if submission.dispatch_id != dispatch.id {
        return Err(SettlementError::DispatchMismatch {
            expected: dispatch.id,
            actual: submission.dispatch_id,
        });
    }
    if submission.driver_id != dispatch.driver_id {
        return Err(SettlementError::DriverMismatch {
            dispatch: dispatch.id,
            driver: submission.driver_id,
        });
    }
    Ok(())
}

fn check_recoveries(submission: &CollectionSubmission) -> Result<(), SettlementError> {
    let recoveries = [
        (submission.credit_received_cash, Field::CreditReceivedCash),
        (submission.credit_received_cheque, Field::CreditReceivedCheque),
        (submission.bounce_received_cash, Field::BounceReceivedCash),
        (submission.bounce_received_cheque, Field::BounceReceivedCheque),
    ];
    for (amount, field) in recoveries {
        if amount < Decimal::ZERO {
            return Err(SettlementError::NegativeAmount(field));
        }
    }
    Ok(())
}
