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

//! # Driver Settlement
//!
//! This library settles a delivery driver's end-of-day cash collection
//! against the stock dispatched to them, and keeps a running record of each
//! driver's cumulative cash variance.
//!
//! ## Core Components
//!
//! - [`SettlementEngine`]: Accepts collections, tracks driver chains, runs the office workflow
//! - [`reconcile`]: Pure reconciliation of one collection against its dispatch
//! - [`VarianceChain`]: Chronological cumulative variance, recomputed on backdated entries
//! - [`CrateReconciliation`]: Returnable crate accounting and missing-empties penalty
//! - [`SettlementError`]: Error types for rejected submissions and workflow misuse
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use driver_settlement_rs::{
//!     CollectionSubmission, DenominationEntry, Dispatch, DispatchId, DriverId, SettlementEngine,
//!     VarianceStatus,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = SettlementEngine::new();
//! let issued_at = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
//! engine
//!     .register_dispatch(Dispatch {
//!         id: DispatchId(1),
//!         driver_id: DriverId(7),
//!         issued_at,
//!         expected_value: dec!(5000),
//!         crates_loaded: 50,
//!     })
//!     .unwrap();
//!
//! let dispatch = engine.dispatch(&DispatchId(1)).unwrap();
//! let mut submission = CollectionSubmission::for_dispatch(&dispatch, issued_at);
//! submission.denominations = vec![DenominationEntry::new(dec!(500), 10)];
//! submission.returned_empty_crates = 50;
//!
//! let record = engine.submit(submission).unwrap();
//! assert_eq!(record.reconciliation.variance_status, VarianceStatus::Matched);
//! assert_eq!(record.cumulative_variance_after, dec!(0));
//! ```
//!
//! ## Thread Safety
//!
//! Reconciliation is pure and runs without locks. Each driver's chain is
//! guarded by its own mutex, so collections for different drivers are
//! processed in parallel.

mod base;
mod channel;
mod claims;
pub mod config;
pub mod cumulative;
pub mod denomination;
mod driver;
mod engine;
pub mod error;
mod outbox;
pub mod payload;
mod reconcile;
pub mod rgb;
mod submission;
pub mod variance;

pub use base::{ActorId, DispatchId, DriverId, SubmissionId};
pub use channel::{ChannelAmounts, ChannelSettlement, settle, variance_percentage};
pub use claims::SettlementClaims;
pub use config::{ConfigError, SettlementConfig};
pub use cumulative::{ChainKey, ChainLink, VarianceChain};
pub use driver::DriverLedger;
pub use engine::{CollectionRecord, DateRange, DriverStats, SettlementEngine};
pub use error::{ErrorKind, Field, SettlementError};
pub use outbox::{PenaltyNotice, PenaltyOutbox};
pub use payload::{DenominationPayload, SubmissionPayload};
pub use reconcile::{Inconsistency, MAX_NOTES_LEN, Reconciliation, reconcile};
pub use rgb::CrateReconciliation;
pub use submission::{CollectionStatus, CollectionSubmission, DenominationEntry, Dispatch};
pub use variance::{VarianceStatus, classify};
