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

//! Error types for settlement processing.
//!
//! Every variant names the offending field or record so that callers can
//! show the driver exactly what to fix. Non-fatal findings are not errors;
//! see [`Inconsistency`](crate::Inconsistency).

use crate::base::{DispatchId, DriverId, SubmissionId};
use crate::submission::CollectionStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Submission field referenced by a validation error.
///
/// Displays as the field's wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    DispatchId,
    DriverId,
    ExpectedCash,
    NoteValue,
    NoteCount,
    Coins,
    ChequeReceived,
    OnlineReceived,
    CreditGiven,
    CreditReceivedCash,
    CreditReceivedCheque,
    BounceReceivedCash,
    BounceReceivedCheque,
    ReturnedFullCrates,
    ReturnedEmptyCrates,
    Notes,
}

impl Field {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Field::DispatchId => "dispatchId",
            Field::DriverId => "driverId",
            Field::ExpectedCash => "expectedCash",
            Field::NoteValue => "noteValue",
            Field::NoteCount => "noteCount",
            Field::Coins => "coins",
            Field::ChequeReceived => "totalChequeReceived",
            Field::OnlineReceived => "totalOnlineReceived",
            Field::CreditGiven => "totalCreditGiven",
            Field::CreditReceivedCash => "creditReceivedCash",
            Field::CreditReceivedCheque => "creditReceivedCheque",
            Field::BounceReceivedCash => "bounceReceivedCash",
            Field::BounceReceivedCheque => "bounceReceivedCheque",
            Field::ReturnedFullCrates => "returnedFullCrates",
            Field::ReturnedEmptyCrates => "returnedEmptyCrates",
            Field::Notes => "notes",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Broad category of a [`SettlementError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was recorded.
    Validation,
    /// The dispatch was already settled (or registered).
    Conflict,
    /// Referenced dispatch or collection does not exist.
    NotFound,
    /// Workflow transition not allowed from the current status.
    InvalidState,
}

/// Settlement processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// A required field is absent
    #[error("missing required field `{0}`")]
    MissingField(Field),

    /// An amount is below zero
    #[error("`{0}` cannot be negative")]
    NegativeAmount(Field),

    /// A count is not representable as a non-negative integer
    #[error("`{0}` must be a non-negative integer")]
    InvalidCount(Field),

    /// A denomination face value is zero or negative
    #[error("denomination value {0} must be positive")]
    InvalidDenomination(Decimal),

    /// An amount, or a sum of amounts, does not fit in a decimal
    #[error("`{0}` is too large")]
    AmountOverflow(Field),

    /// Cash, cheque, online and credit are all zero
    #[error("no amounts reported: cash, cheque, online and credit totals are all zero")]
    NoAmountsReported,

    /// Free-text notes exceed the storage limit
    #[error("`notes` cannot exceed {max} characters")]
    NotesTooLong { max: usize },

    /// Submission references a different dispatch than the one supplied
    #[error("submission is for dispatch {actual}, expected dispatch {expected}")]
    DispatchMismatch {
        expected: DispatchId,
        actual: DispatchId,
    },

    /// Dispatch was issued to another driver
    #[error("dispatch {dispatch} does not belong to driver {driver}")]
    DriverMismatch {
        dispatch: DispatchId,
        driver: DriverId,
    },

    /// A collection has already been accepted for this dispatch
    #[error("cash collection already submitted for dispatch {0}")]
    AlreadySubmitted(DispatchId),

    /// Dispatch snapshot registered twice
    #[error("dispatch {0} is already registered")]
    DuplicateDispatch(DispatchId),

    /// Referenced dispatch does not exist
    #[error("dispatch {0} not found")]
    DispatchNotFound(DispatchId),

    /// Referenced collection does not exist
    #[error("cash collection {0} not found")]
    CollectionNotFound(SubmissionId),

    /// Workflow step attempted from the wrong status
    #[error("cash collection is {actual}, expected {expected}")]
    InvalidStatus {
        expected: CollectionStatus,
        actual: CollectionStatus,
    },
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::MissingField(_)
            | SettlementError::NegativeAmount(_)
            | SettlementError::InvalidCount(_)
            | SettlementError::AmountOverflow(_)
            | SettlementError::InvalidDenomination(_)
            | SettlementError::NoAmountsReported
            | SettlementError::NotesTooLong { .. }
            | SettlementError::DispatchMismatch { .. }
            | SettlementError::DriverMismatch { .. } => ErrorKind::Validation,
            SettlementError::AlreadySubmitted(_) | SettlementError::DuplicateDispatch(_) => {
                ErrorKind::Conflict
            }
            SettlementError::DispatchNotFound(_) | SettlementError::CollectionNotFound(_) => {
                ErrorKind::NotFound
            }
            SettlementError::InvalidStatus { .. } => ErrorKind::InvalidState,
        }
    }

    /// The field a validation error points at, if any.
    pub fn field(&self) -> Option<Field> {
        match self {
            SettlementError::MissingField(field)
            | SettlementError::NegativeAmount(field)
            | SettlementError::InvalidCount(field)
            | SettlementError::AmountOverflow(field) => Some(*field),
            SettlementError::InvalidDenomination(_) => Some(Field::NoteValue),
            SettlementError::NotesTooLong { .. } => Some(Field::Notes),
            SettlementError::DispatchMismatch { .. } => Some(Field::DispatchId),
            SettlementError::DriverMismatch { .. } => Some(Field::DriverId),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            SettlementError::MissingField(Field::ExpectedCash).to_string(),
            "missing required field `expectedCash`"
        );
        assert_eq!(
            SettlementError::NegativeAmount(Field::ChequeReceived).to_string(),
            "`totalChequeReceived` cannot be negative"
        );
        assert_eq!(
            SettlementError::InvalidCount(Field::ReturnedEmptyCrates).to_string(),
            "`returnedEmptyCrates` must be a non-negative integer"
        );
        assert_eq!(
            SettlementError::InvalidDenomination(dec!(0)).to_string(),
            "denomination value 0 must be positive"
        );
        assert_eq!(
            SettlementError::AmountOverflow(Field::NoteValue).to_string(),
            "`noteValue` is too large"
        );
        assert_eq!(
            SettlementError::AlreadySubmitted(DispatchId(7)).to_string(),
            "cash collection already submitted for dispatch 7"
        );
        assert_eq!(
            SettlementError::DriverMismatch {
                dispatch: DispatchId(3),
                driver: DriverId(9)
            }
            .to_string(),
            "dispatch 3 does not belong to driver 9"
        );
        assert_eq!(
            SettlementError::InvalidStatus {
                expected: CollectionStatus::Submitted,
                actual: CollectionStatus::Verified,
            }
            .to_string(),
            "cash collection is Verified, expected Submitted"
        );
    }

    #[test]
    fn conflict_is_distinct_from_validation() {
        assert_eq!(
            SettlementError::AlreadySubmitted(DispatchId(1)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SettlementError::NoAmountsReported.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SettlementError::CollectionNotFound(SubmissionId(1)).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn validation_errors_name_their_field() {
        assert_eq!(
            SettlementError::NegativeAmount(Field::Coins).field(),
            Some(Field::Coins)
        );
        assert_eq!(
            SettlementError::InvalidDenomination(dec!(-5)).field(),
            Some(Field::NoteValue)
        );
        assert_eq!(SettlementError::NoAmountsReported.field(), None);
    }
}
