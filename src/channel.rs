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

//! Channel settlement: combines every payment channel into a variance against
//! the dispatch's expected value.
//!
//! | Figure | Formula |
//! |--------|---------|
//! | total received | cash + cheque + online |
//! | raw variance | (total received + credit given) − expected |
//!
//! Credit extended to retailers discharges the driver's obligation for the
//! stock, so it is added. Recoveries of earlier credit or bounced cheques
//! settle another period and never enter the variance.

use crate::error::{Field, SettlementError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Amounts reported through each settlement channel for one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelAmounts {
    pub cash: Decimal,
    pub cheque: Decimal,
    pub online: Decimal,
    pub credit_given: Decimal,
}

impl ChannelAmounts {
    fn validate(&self) -> Result<(), SettlementError> {
        let checks = [
            (self.cash, Field::Coins),
            (self.cheque, Field::ChequeReceived),
            (self.online, Field::OnlineReceived),
            (self.credit_given, Field::CreditGiven),
        ];
        for (amount, field) in checks {
            if amount < Decimal::ZERO {
                return Err(SettlementError::NegativeAmount(field));
            }
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.cash.is_zero()
            && self.cheque.is_zero()
            && self.online.is_zero()
            && self.credit_given.is_zero()
    }
}

/// Result of combining the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettlement {
    pub total_received: Decimal,
    pub raw_variance: Decimal,
}

/// Computes total received and raw variance.
///
/// # Errors
///
/// - [`SettlementError::MissingField`] when `expected` is `None`.
/// - [`SettlementError::NegativeAmount`] when `expected` or any channel is negative.
/// - [`SettlementError::AmountOverflow`] when the channels sum past [`Decimal::MAX`].
pub fn settle(
    amounts: &ChannelAmounts,
    expected: Option<Decimal>,
) -> Result<ChannelSettlement, SettlementError> {
    let expected = expected.ok_or(SettlementError::MissingField(Field::ExpectedCash))?;
    if expected < Decimal::ZERO {
        return Err(SettlementError::NegativeAmount(Field::ExpectedCash));
    }
    amounts.validate()?;

    let total_received = amounts
        .cash
        .checked_add(amounts.cheque)
        .ok_or(SettlementError::AmountOverflow(Field::ChequeReceived))?
        .checked_add(amounts.online)
        .ok_or(SettlementError::AmountOverflow(Field::OnlineReceived))?;
    // both operands are non-negative, so the subtraction cannot overflow
    let raw_variance = total_received
        .checked_add(amounts.credit_given)
        .ok_or(SettlementError::AmountOverflow(Field::CreditGiven))?
        - expected;

    Ok(ChannelSettlement {
        total_received,
        raw_variance,
    })
}

/// Variance as a percentage of the expected value, to two decimal places.
///
/// `None` when nothing was expected, or when the ratio is too large to represent.
pub fn variance_percentage(raw_variance: Decimal, expected: Decimal) -> Option<Decimal> {
    if expected.is_zero() {
        return None;
    }
    raw_variance
        .checked_div(expected)?
        .checked_mul(dec!(100))
        .map(|percentage| percentage.round_dp(2))
}
