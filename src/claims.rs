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

//! Thread-safe settlement claims, one per dispatch.
//!
//! A dispatch moves from awaiting settlement to settled exactly once. The
//! claim is an atomic check-and-insert keyed by dispatch, so two racing
//! submissions for the same dispatch cannot both reach the cumulative tracker.

use crate::SettlementError;
use crate::base::{DispatchId, SubmissionId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Accepted submission per dispatch.
///
/// Backed by a [`DashMap`] for O(1) conflict detection. All operations are
/// safe for concurrent access.
#[derive(Debug)]
pub struct SettlementClaims {
    claims: DashMap<DispatchId, SubmissionId>,
}

impl SettlementClaims {
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
        }
    }

    /// Claims `dispatch_id` for `submission_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::AlreadySubmitted`] if the dispatch has
    /// already been claimed.
    pub fn claim(
        &self,
        dispatch_id: DispatchId,
        submission_id: SubmissionId,
    ) -> Result<(), SettlementError> {
        // Use entry API for atomic check-and-insert to prevent race conditions
        match self.claims.entry(dispatch_id) {
            Entry::Occupied(_) => Err(SettlementError::AlreadySubmitted(dispatch_id)),
            Entry::Vacant(entry) => {
                entry.insert(submission_id);
                Ok(())
            }
        }
    }

    pub fn claimed_by(&self, dispatch_id: &DispatchId) -> Option<SubmissionId> {
        self.claims.get(dispatch_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl Default for SettlementClaims {
    fn default() -> Self {
        Self::new()
    }
}
