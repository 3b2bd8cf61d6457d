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

//! Lock-free outbox of crate penalty recommendations.
//!
//! The engine never charges a driver. Once a collection is verified, any
//! missing-empties penalty is queued here for the account ledger to pick up.

use crate::base::{DispatchId, DriverId, SubmissionId};
use crossbeam::queue::SegQueue;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyNotice {
    pub submission_id: SubmissionId,
    pub driver_id: DriverId,
    pub dispatch_id: DispatchId,
    pub missing_empties: u32,
    pub amount: Decimal,
}

/// FIFO queue of [`PenaltyNotice`]s, safe for concurrent producers and consumers.
#[derive(Debug, Default)]
pub struct PenaltyOutbox {
    notices: SegQueue<PenaltyNotice>,
}

impl PenaltyOutbox {
    pub fn new() -> Self {
        Self {
            notices: SegQueue::new(),
        }
    }

    pub fn push(&self, notice: PenaltyNotice) {
        self.notices.push(notice);
    }

    /// Takes every queued notice, oldest first.
    pub fn drain(&self) -> Vec<PenaltyNotice> {
        std::iter::from_fn(|| self.notices.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
