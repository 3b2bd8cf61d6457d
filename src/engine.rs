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

//! Settlement engine.
//!
//! The [`SettlementEngine`] accepts collection submissions against registered
//! dispatches, keeps each driver's cumulative variance chain, and serves the
//! query surface and office workflow.
//!
//! # Submission
//!
//! 1. The dispatch snapshot is looked up and the collection reconciled (pure).
//! 2. The dispatch is claimed; a second claim is a conflict, not bad data.
//! 3. The variance is folded into the driver's chain under the driver's lock.
//!
//! # Thread Safety
//!
//! Dispatches, collections and driver ledgers live in [`DashMap`]s. Different
//! drivers proceed in parallel; one driver's chain updates are serialized by
//! its [`DriverLedger`] mutex. The driver mutex is never held while touching
//! the maps.

use crate::base::{ActorId, DispatchId, DriverId, SubmissionId};
use crate::claims::SettlementClaims;
use crate::config::SettlementConfig;
use crate::cumulative::{ChainKey, ChainLink, VarianceChain};
use crate::driver::DriverLedger;
use crate::outbox::{PenaltyNotice, PenaltyOutbox};
use crate::payload::SubmissionPayload;
use crate::reconcile::{Reconciliation, reconcile};
use crate::submission::{CollectionStatus, CollectionSubmission, Dispatch};
use crate::SettlementError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Inclusive bounds on a collection's timestamp. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[derive(Debug, Clone)]
struct StoredCollection {
    submission: CollectionSubmission,
    reconciliation: Reconciliation,
    status: CollectionStatus,
    verified_by: Option<ActorId>,
    verified_at: Option<DateTime<Utc>>,
}

impl StoredCollection {
    fn expect_status(&self, expected: CollectionStatus) -> Result<(), SettlementError> {
        if self.status != expected {
            return Err(SettlementError::InvalidStatus {
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    fn append_notes(&mut self, heading: &str, notes: Option<&str>) {
        let Some(notes) = notes.filter(|notes| !notes.is_empty()) else {
            return;
        };
        let entry = format!("{heading}: {notes}");
        if self.submission.notes.is_empty() {
            self.submission.notes = entry;
        } else {
            self.submission.notes = format!("{}\n\n{entry}", self.submission.notes);
        }
    }
}

/// A stored collection with its reconciliation and place in the driver's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: SubmissionId,
    pub submission: CollectionSubmission,
    pub reconciliation: Reconciliation,
    pub status: CollectionStatus,
    pub previous_variance: Decimal,
    pub cumulative_variance_after: Decimal,
    pub verified_by: Option<ActorId>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Aggregate figures of a driver's collections within a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStats {
    pub driver_id: Option<DriverId>,
    pub total_collections: usize,
    pub total_cash_collected: Decimal,
    pub total_expected_cash: Decimal,
    pub total_variance: Decimal,
    /// Cumulative variance after the latest collection in range.
    pub cumulative_variance: Decimal,
    pub total_penalty: Decimal,
    pub submitted: usize,
    pub verified: usize,
    pub reconciled: usize,
}

/// Settlement engine that manages dispatches, collections and driver ledgers.
///
/// # Invariants
///
/// - At most one collection is accepted per dispatch.
/// - A driver's cumulative variance is the fold of their collections'
///   raw variance in `(collected_at, submission id)` order.
/// - Status only moves `Submitted` -> `Verified` -> `Reconciled`; inputs can be
///   amended only while `Submitted`.
pub struct SettlementEngine {
    config: SettlementConfig,
    /// Dispatch snapshots indexed by dispatch ID.
    dispatches: DashMap<DispatchId, Dispatch>,
    claims: SettlementClaims,
    collections: DashMap<SubmissionId, StoredCollection>,
    drivers: DashMap<DriverId, Arc<DriverLedger>>,
    penalties: PenaltyOutbox,
    next_id: AtomicU32,
}

impl SettlementEngine {
    /// Creates an engine with the default business parameters.
    pub fn new() -> Self {
        Self::with_config(SettlementConfig::default())
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        SettlementEngine {
            config,
            dispatches: DashMap::new(),
            claims: SettlementClaims::new(),
            collections: DashMap::new(),
            drivers: DashMap::new(),
            penalties: PenaltyOutbox::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Registers a dispatch snapshot provided by dispatch management.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::DuplicateDispatch`] if the ID is taken.
    pub fn register_dispatch(&self, dispatch: Dispatch) -> Result<(), SettlementError> {
        match self.dispatches.entry(dispatch.id) {
            Entry::Occupied(_) => Err(SettlementError::DuplicateDispatch(dispatch.id)),
            Entry::Vacant(entry) => {
                entry.insert(dispatch);
                Ok(())
            }
        }
    }

    pub fn dispatch(&self, dispatch_id: &DispatchId) -> Option<Dispatch> {
        self.dispatches.get(dispatch_id).map(|entry| entry.clone())
    }

    /// Whether a collection has been accepted for the dispatch.
    pub fn is_settled(&self, dispatch_id: &DispatchId) -> bool {
        self.claims.claimed_by(dispatch_id).is_some()
    }

    /// Validates a wire payload and submits it.
    pub fn submit_payload(
        &self,
        payload: SubmissionPayload,
        received_at: DateTime<Utc>,
    ) -> Result<CollectionRecord, SettlementError> {
        self.submit(payload.into_submission(received_at)?)
    }

    /// Accepts a collection for its dispatch.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::DispatchNotFound`] - dispatch not registered.
    /// - [`SettlementError::AlreadySubmitted`] - dispatch already settled.
    /// - Any validation error from [`reconcile`].
    pub fn submit(
        &self,
        submission: CollectionSubmission,
    ) -> Result<CollectionRecord, SettlementError> {
        let dispatch = self
            .dispatch(&submission.dispatch_id)
            .ok_or(SettlementError::DispatchNotFound(submission.dispatch_id))?;
        let reconciliation = reconcile(&dispatch, &submission, &self.config)?;

        let id = SubmissionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = self.claims.claim(dispatch.id, id) {
            warn!(dispatch = %dispatch.id, driver = %dispatch.driver_id, "{e}");
            return Err(e);
        }

        // Chain first: a collection is never visible without its link.
        let link = self
            .ledger_for(submission.driver_id)
            .record(ChainKey::new(submission.collected_at, id), reconciliation.raw_variance);

        info!(
            submission = %id,
            dispatch = %dispatch.id,
            driver = %dispatch.driver_id,
            variance = %reconciliation.raw_variance,
            status = %reconciliation.variance_status,
            cumulative = %link.cumulative_variance,
            "cash collection accepted"
        );

        let stored = StoredCollection {
            submission,
            reconciliation,
            status: CollectionStatus::Submitted,
            verified_by: None,
            verified_at: None,
        };
        let record = Self::to_record(id, &stored, Some(link));
        self.collections.insert(id, stored);
        Ok(record)
    }

    /// Validates a wire payload and amends collection `id` with it.
    ///
    /// A payload without `collectionDate` keeps the collection's current date,
    /// and with it its place in the driver's chain.
    pub fn amend_payload(
        &self,
        id: SubmissionId,
        payload: SubmissionPayload,
    ) -> Result<CollectionRecord, SettlementError> {
        let collected_at = self
            .collections
            .get(&id)
            .map(|stored| stored.submission.collected_at)
            .ok_or(SettlementError::CollectionNotFound(id))?;
        self.amend(id, payload.into_submission(collected_at)?)
    }

    /// Replaces the inputs of a collection that has not been verified yet.
    ///
    /// The collection keeps its ID; its chain position follows the new
    /// collection time and every later cumulative figure is recomputed.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::CollectionNotFound`] - unknown ID.
    /// - [`SettlementError::InvalidStatus`] - already verified.
    /// - [`SettlementError::DispatchMismatch`] - amendment names another dispatch.
    /// - Any validation error from [`reconcile`].
    pub fn amend(
        &self,
        id: SubmissionId,
        submission: CollectionSubmission,
    ) -> Result<CollectionRecord, SettlementError> {
        let mut stored = self
            .collections
            .get_mut(&id)
            .ok_or(SettlementError::CollectionNotFound(id))?;
        stored.expect_status(CollectionStatus::Submitted)?;
        if submission.dispatch_id != stored.submission.dispatch_id {
            return Err(SettlementError::DispatchMismatch {
                expected: stored.submission.dispatch_id,
                actual: submission.dispatch_id,
            });
        }

        let dispatch = self
            .dispatch(&submission.dispatch_id)
            .ok_or(SettlementError::DispatchNotFound(submission.dispatch_id))?;
        let reconciliation = reconcile(&dispatch, &submission, &self.config)?;

        let link = self
            .ledger_for(submission.driver_id)
            .record(ChainKey::new(submission.collected_at, id), reconciliation.raw_variance);
        info!(
            submission = %id,
            variance = %reconciliation.raw_variance,
            cumulative = %link.cumulative_variance,
            "cash collection amended"
        );

        stored.submission = submission;
        stored.reconciliation = reconciliation;
        Ok(Self::to_record(id, &stored, Some(link)))
    }

    /// Marks a submitted collection verified by `actor`.
    ///
    /// Queues a [`PenaltyNotice`] when empties are missing.
    pub fn verify(
        &self,
        id: SubmissionId,
        actor: ActorId,
        notes: Option<&str>,
    ) -> Result<CollectionRecord, SettlementError> {
        let mut stored = self
            .collections
            .get_mut(&id)
            .ok_or(SettlementError::CollectionNotFound(id))?;
        stored.expect_status(CollectionStatus::Submitted)?;

        stored.status = CollectionStatus::Verified;
        stored.verified_at = Some(Utc::now());
        stored.append_notes("Verification Notes", notes);
        info!(submission = %id, actor = %actor, "cash collection verified");
        stored.verified_by = Some(actor);

        let crates = stored.reconciliation.crates;
        if crates.missing_empties > 0 {
            self.penalties.push(PenaltyNotice {
                submission_id: id,
                driver_id: stored.submission.driver_id,
                dispatch_id: stored.submission.dispatch_id,
                missing_empties: crates.missing_empties,
                amount: crates.penalty_amount,
            });
        }

        let link = self.link_of(stored.submission.driver_id, id);
        Ok(Self::to_record(id, &stored, link))
    }

    /// Marks a verified collection reconciled.
    pub fn mark_reconciled(
        &self,
        id: SubmissionId,
        notes: Option<&str>,
    ) -> Result<CollectionRecord, SettlementError> {
        let mut stored = self
            .collections
            .get_mut(&id)
            .ok_or(SettlementError::CollectionNotFound(id))?;
        stored.expect_status(CollectionStatus::Verified)?;

        stored.status = CollectionStatus::Reconciled;
        stored.append_notes("Reconciliation Notes", notes);
        info!(submission = %id, "cash collection reconciled");

        let link = self.link_of(stored.submission.driver_id, id);
        Ok(Self::to_record(id, &stored, link))
    }

    /// Recomputes a collection's reconciliation from its stored inputs.
    ///
    /// Takes no locks beyond the map reads, so it may run concurrently with
    /// anything else.
    pub fn recompute(&self, id: SubmissionId) -> Result<Reconciliation, SettlementError> {
        let submission = self
            .collections
            .get(&id)
            .map(|stored| stored.submission.clone())
            .ok_or(SettlementError::CollectionNotFound(id))?;
        let dispatch = self
            .dispatch(&submission.dispatch_id)
            .ok_or(SettlementError::DispatchNotFound(submission.dispatch_id))?;
        reconcile(&dispatch, &submission, &self.config)
    }

    pub fn collection(&self, id: SubmissionId) -> Result<CollectionRecord, SettlementError> {
        let stored = self
            .collections
            .get(&id)
            .map(|stored| stored.clone())
            .ok_or(SettlementError::CollectionNotFound(id))?;
        let link = self.link_of(stored.submission.driver_id, id);
        Ok(Self::to_record(id, &stored, link))
    }

    /// Every collection, in submission order.
    pub fn collections(&self) -> Vec<CollectionRecord> {
        self.collections_matching(None)
    }

    /// Collections currently in `status`, in submission order.
    pub fn collections_with_status(&self, status: CollectionStatus) -> Vec<CollectionRecord> {
        self.collections_matching(Some(status))
    }

    fn collections_matching(&self, status: Option<CollectionStatus>) -> Vec<CollectionRecord> {
        let mut stored: Vec<(SubmissionId, StoredCollection)> = self
            .collections
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.value().status == status))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        stored.sort_by_key(|(id, _)| *id);

        stored
            .into_iter()
            .map(|(id, stored)| {
                let link = self.link_of(stored.submission.driver_id, id);
                Self::to_record(id, &stored, link)
            })
            .collect()
    }

    /// A driver's collections within `range`, newest first.
    pub fn collections_by_driver(
        &self,
        driver_id: DriverId,
        range: DateRange,
    ) -> Vec<CollectionRecord> {
        let chain = self
            .driver_ledger(driver_id)
            .map(|ledger| ledger.chain())
            .unwrap_or_default();

        let mut records: Vec<CollectionRecord> = chain
            .links()
            .iter()
            .filter(|link| range.contains(link.key.collected_at))
            .filter_map(|link| {
                let stored = self.collections.get(&link.key.submission_id)?.clone();
                Some(Self::to_record(link.key.submission_id, &stored, Some(*link)))
            })
            .collect();
        records.reverse();
        records
    }

    /// Aggregate statistics of a driver's collections within `range`.
    pub fn driver_stats(&self, driver_id: DriverId, range: DateRange) -> DriverStats {
        let records = self.collections_by_driver(driver_id, range);
        let mut stats = DriverStats {
            driver_id: Some(driver_id),
            total_collections: records.len(),
            // newest first
            cumulative_variance: records
                .first()
                .map_or(Decimal::ZERO, |record| record.cumulative_variance_after),
            ..DriverStats::default()
        };

        for record in &records {
            let result = &record.reconciliation;
            stats.total_cash_collected = stats
                .total_cash_collected
                .saturating_add(result.cash_subtotal);
            stats.total_expected_cash = stats
                .total_expected_cash
                .saturating_add(result.expected_cash);
            stats.total_variance = stats.total_variance.saturating_add(result.raw_variance);
            stats.total_penalty = stats.total_penalty.saturating_add(result.crates.penalty_amount);
            match record.status {
                CollectionStatus::Submitted => stats.submitted += 1,
                CollectionStatus::Verified => stats.verified += 1,
                CollectionStatus::Reconciled => stats.reconciled += 1,
            }
        }
        stats
    }

    pub fn driver_ledger(&self, driver_id: DriverId) -> Option<Arc<DriverLedger>> {
        self.drivers.get(&driver_id).map(|entry| Arc::clone(entry.value()))
    }

    /// All driver ledgers ordered by driver ID.
    pub fn drivers(&self) -> Vec<Arc<DriverLedger>> {
        let mut drivers: Vec<(DriverId, Arc<DriverLedger>)> = self
            .drivers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        drivers.sort_by_key(|(driver_id, _)| *driver_id);
        drivers.into_iter().map(|(_, ledger)| ledger).collect()
    }

    /// Snapshot of a driver's variance chain.
    pub fn variance_chain(&self, driver_id: DriverId) -> VarianceChain {
        self.driver_ledger(driver_id)
            .map(|ledger| ledger.chain())
            .unwrap_or_default()
    }

    /// Takes the queued penalty recommendations.
    pub fn drain_penalties(&self) -> Vec<PenaltyNotice> {
        self.penalties.drain()
    }

    fn ledger_for(&self, driver_id: DriverId) -> Arc<DriverLedger> {
        // Clone the Arc out so the shard lock is released before the driver lock is taken.
        let ledger = self
            .drivers
            .entry(driver_id)
            .or_insert_with(|| Arc::new(DriverLedger::new(driver_id)));
        Arc::clone(ledger.value())
    }

    fn link_of(&self, driver_id: DriverId, id: SubmissionId) -> Option<ChainLink> {
        self.driver_ledger(driver_id)?.link(id)
    }

    fn to_record(
        id: SubmissionId,
        stored: &StoredCollection,
        link: Option<ChainLink>,
    ) -> CollectionRecord {
        let raw_variance = stored.reconciliation.raw_variance;
        let (previous_variance, cumulative_variance_after) = link.map_or(
            (Decimal::ZERO, raw_variance),
            |link| (link.previous_variance, link.cumulative_variance),
        );
        CollectionRecord {
            id,
            submission: stored.submission.clone(),
            reconciliation: stored.reconciliation.clone(),
            status: stored.status,
            previous_variance,
            cumulative_variance_after,
            verified_by: stored.verified_by.clone(),
            verified_at: stored.verified_at,
        }
    }
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new()
    }
}
