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

//! Per-driver variance ledger.
//!
//! Every read-modify-write of a driver's cumulative variance happens under
//! that driver's mutex, so concurrent submissions by one driver serialize
//! while different drivers proceed in parallel.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use driver_settlement_rs::{DriverId, DriverLedger};
//!
//! let ledger = DriverLedger::new(DriverId(1));
//! assert_eq!(ledger.cumulative_variance(), dec!(0));
//! ```

use crate::base::{DriverId, SubmissionId};
use crate::cumulative::{ChainKey, ChainLink, VarianceChain};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

#[derive(Debug)]
struct DriverData {
    driver_id: DriverId,
    chain: VarianceChain,
}

impl DriverData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.chain
                .links()
                .windows(2)
                .all(|pair| pair[0].key < pair[1].key
                    && pair[1].previous_variance == pair[0].cumulative_variance),
            "Invariant violated: variance chain out of order for driver {}",
            self.driver_id
        );
    }
}

/// Variance history of one driver.
#[derive(Debug)]
pub struct DriverLedger {
    inner: Mutex<DriverData>,
}

impl DriverLedger {
    const DECIMAL_PRECISION: u32 = 2;

    pub fn new(driver_id: DriverId) -> Self {
        Self {
            inner: Mutex::new(DriverData {
                driver_id,
                chain: VarianceChain::new(),
            }),
        }
    }

    pub fn driver_id(&self) -> DriverId {
        self.inner.lock().driver_id
    }

    /// Records (or re-records) a collection's variance and returns its link.
    pub fn record(&self, key: ChainKey, raw_variance: Decimal) -> ChainLink {
        let mut data = self.inner.lock();
        let link = data.chain.insert(key, raw_variance);
        data.assert_invariants();
        link
    }

    pub fn link(&self, submission_id: SubmissionId) -> Option<ChainLink> {
        self.inner.lock().chain.link(submission_id).copied()
    }

    pub fn cumulative_variance(&self) -> Decimal {
        self.inner.lock().chain.total()
    }

    pub fn collections(&self) -> usize {
        self.inner.lock().chain.len()
    }

    /// Copy of the chain, for reporting without holding the lock.
    pub fn chain(&self) -> VarianceChain {
        self.inner.lock().chain.clone()
    }
}

impl Serialize for DriverLedger {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("DriverLedger", 3)?;
        state.serialize_field("driver", &data.driver_id)?;
        state.serialize_field("collections", &data.chain.len())?;
        state.serialize_field(
            "cumulative_variance",
            &data.chain.total().round_dp(DriverLedger::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}
