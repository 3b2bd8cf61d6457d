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

//! Cumulative variance tracking.
//!
//! A driver's cumulative variance is a fold over their collections in
//! chronological order. Instead of a bare running counter, the chain keeps
//! every link so that a backdated insertion or an amendment recomputes the
//! totals from the affected position onward.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use driver_settlement_rs::{ChainKey, SubmissionId, VarianceChain};
//! use rust_decimal_macros::dec;
//!
//! let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 18, 0, 0).unwrap();
//! let mut chain = VarianceChain::new();
//! chain.insert(ChainKey::new(day(1), SubmissionId(1)), dec!(50));
//! chain.insert(ChainKey::new(day(3), SubmissionId(2)), dec!(-30));
//! // backdated correction lands between the two
//! chain.insert(ChainKey::new(day(2), SubmissionId(3)), dec!(-10));
//!
//! assert_eq!(chain.cumulative_after(SubmissionId(2)), Some(dec!(10)));
//! assert_eq!(chain.total(), dec!(10));
//! ```

use crate::base::SubmissionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// `previous + raw_variance`, saturating at the decimal bounds.
pub fn cumulative_after(previous: Decimal, raw_variance: Decimal) -> Decimal {
    previous.saturating_add(raw_variance)
}

/// Running totals of an already ordered variance sequence.
pub fn running_totals<I>(variances: I) -> Vec<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    variances
        .into_iter()
        .scan(Decimal::ZERO, |total, variance| {
            *total = cumulative_after(*total, variance);
            Some(*total)
        })
        .collect()
}

/// Ordering key of a link: collection time, then submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChainKey {
    pub collected_at: DateTime<Utc>,
    pub submission_id: SubmissionId,
}

impl ChainKey {
    pub fn new(collected_at: DateTime<Utc>, submission_id: SubmissionId) -> Self {
        Self {
            collected_at,
            submission_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub key: ChainKey,
    pub raw_variance: Decimal,
    pub previous_variance: Decimal,
    pub cumulative_variance: Decimal,
}

/// Chronologically ordered variance history of one driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarianceChain {
    links: Vec<ChainLink>,
}

impl VarianceChain {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Rebuilds a chain from history given in any order.
    pub fn from_history<I>(history: I) -> Self
    where
        I: IntoIterator<Item = (ChainKey, Decimal)>,
    {
        let mut links: Vec<ChainLink> = Vec::new();
        for (key, raw_variance) in history {
            // later entries for the same submission win
            links.retain(|link| link.key.submission_id != key.submission_id);
            links.push(ChainLink {
                key,
                raw_variance,
                previous_variance: Decimal::ZERO,
                cumulative_variance: Decimal::ZERO,
            });
        }
        links.sort_by_key(|link| link.key);

        let mut chain = Self { links };
        chain.recompute_from(0);
        chain
    }

    /// Inserts a link at its chronological position and returns it with its
    /// previous and cumulative variance filled in.
    ///
    /// A link already present for the same submission is replaced, so
    /// retries do not double count.
    pub fn insert(&mut self, key: ChainKey, raw_variance: Decimal) -> ChainLink {
        let removed_at = self.detach(key.submission_id);

        let index = self.links.partition_point(|link| link.key < key);
        self.links.insert(
            index,
            ChainLink {
                key,
                raw_variance,
                previous_variance: Decimal::ZERO,
                cumulative_variance: Decimal::ZERO,
            },
        );

        let from = removed_at.map_or(index, |removed| removed.min(index));
        self.recompute_from(from);
        self.links[index]
    }

    /// Removes a submission's link, recomputing everything after it.
    pub fn remove(&mut self, submission_id: SubmissionId) -> Option<ChainLink> {
        let index = self.position(submission_id)?;
        let link = self.links.remove(index);
        self.recompute_from(index);
        Some(link)
    }

    pub fn link(&self, submission_id: SubmissionId) -> Option<&ChainLink> {
        self.position(submission_id).map(|index| &self.links[index])
    }

    pub fn cumulative_after(&self, submission_id: SubmissionId) -> Option<Decimal> {
        self.link(submission_id).map(|link| link.cumulative_variance)
    }

    /// Cumulative variance after the latest collection; zero when empty.
    pub fn total(&self) -> Decimal {
        self.links
            .last()
            .map_or(Decimal::ZERO, |link| link.cumulative_variance)
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn position(&self, submission_id: SubmissionId) -> Option<usize> {
        self.links
            .iter()
            .position(|link| link.key.submission_id == submission_id)
    }

    fn detach(&mut self, submission_id: SubmissionId) -> Option<usize> {
        let index = self.position(submission_id)?;
        self.links.remove(index);
        Some(index)
    }

    fn recompute_from(&mut self, index: usize) {
        let mut previous = match index.checked_sub(1) {
            Some(before) => self.links[before].cumulative_variance,
            None => Decimal::ZERO,
        };
        for link in &mut self.links[index..] {
            link.previous_variance = previous;
            link.cumulative_variance = cumulative_after(previous, link.raw_variance);
            previous = link.cumulative_variance;
        }
        debug!(
            from = index,
            links = self.links.len(),
            total = %previous,
            "recomputed variance chain"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn key(day: u32, id: u32) -> ChainKey {
        ChainKey::new(
            Utc.with_ymd_and_hms(2025, 1, day, 17, 30, 0).unwrap(),
            SubmissionId(id),
        )
    }

    fn cumulatives(chain: &VarianceChain) -> Vec<Decimal> {
        chain.links().iter().map(|link| link.cumulative_variance).collect()
    }

    #[test]
    fn running_totals_fold_in_order() {
        assert_eq!(
            running_totals([dec!(50), dec!(-30), dec!(10)]),
            vec![dec!(50), dec!(20), dec!(30)]
        );
        assert!(running_totals(std::iter::empty()).is_empty());
    }

    #[test]
    fn in_order_inserts_accumulate() {
        let mut chain = VarianceChain::new();
        assert_eq!(chain.insert(key(1, 1), dec!(50)).cumulative_variance, dec!(50));
        assert_eq!(chain.insert(key(2, 2), dec!(-30)).cumulative_variance, dec!(20));
        assert_eq!(chain.insert(key(3, 3), dec!(10)).cumulative_variance, dec!(30));
        assert_eq!(chain.total(), dec!(30));
    }

    #[test]
    fn backdated_insert_recomputes_following_links() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 1), dec!(50));
        chain.insert(key(3, 2), dec!(-30));
        chain.insert(key(4, 3), dec!(10));

        let after = chain.insert(key(2, 4), dec!(-10));

        assert_eq!(after.cumulative_variance, dec!(40));
        assert_eq!(after.previous_variance, dec!(50));
        assert_eq!(
            cumulatives(&chain),
            vec![dec!(50), dec!(40), dec!(10), dec!(20)]
        );
        let link = chain.link(SubmissionId(2)).unwrap();
        assert_eq!(link.previous_variance, dec!(40));
    }

    #[test]
    fn same_timestamp_orders_by_submission() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 2), dec!(5));
        chain.insert(key(1, 1), dec!(7));
        let ids: Vec<SubmissionId> = chain.links().iter().map(|l| l.key.submission_id).collect();
        assert_eq!(ids, vec![SubmissionId(1), SubmissionId(2)]);
        assert_eq!(chain.cumulative_after(SubmissionId(2)), Some(dec!(12)));
    }

    #[test]
    fn reinserting_a_submission_replaces_it() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 1), dec!(50));
        chain.insert(key(2, 2), dec!(-30));
        chain.insert(key(1, 1), dec!(50));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.total(), dec!(20));
    }

    #[test]
    fn moving_a_link_earlier_recomputes_from_new_position() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 1), dec!(10));
        chain.insert(key(2, 2), dec!(20));
        chain.insert(key(3, 3), dec!(30));

        // amendment moves submission 3 before submission 2 and changes its variance
        chain.insert(ChainKey::new(key(1, 3).collected_at, SubmissionId(3)), dec!(-5));

        let ids: Vec<SubmissionId> = chain.links().iter().map(|l| l.key.submission_id).collect();
        assert_eq!(ids, vec![SubmissionId(1), SubmissionId(3), SubmissionId(2)]);
        assert_eq!(cumulatives(&chain), vec![dec!(10), dec!(5), dec!(25)]);
    }

    #[test]
    fn moving_a_link_later_recomputes_from_old_position() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 1), dec!(10));
        chain.insert(key(2, 2), dec!(20));
        chain.insert(key(3, 3), dec!(30));

        chain.insert(key(4, 1), dec!(10));

        assert_eq!(cumulatives(&chain), vec![dec!(20), dec!(50), dec!(60)]);
    }

    #[test]
    fn remove_recomputes_tail() {
        let mut chain = VarianceChain::new();
        chain.insert(key(1, 1), dec!(50));
        chain.insert(key(2, 2), dec!(-30));
        chain.insert(key(3, 3), dec!(10));

        let removed = chain.remove(SubmissionId(2)).unwrap();
        assert_eq!(removed.raw_variance, dec!(-30));
        assert_eq!(cumulatives(&chain), vec![dec!(50), dec!(60)]);
        assert!(chain.remove(SubmissionId(2)).is_none());
    }

    #[test]
    fn history_in_any_order_builds_same_chain() {
        let ordered = VarianceChain::from_history([
            (key(1, 1), dec!(50)),
            (key(2, 2), dec!(-10)),
            (key(3, 3), dec!(-30)),
        ]);
        let shuffled = VarianceChain::from_history([
            (key(3, 3), dec!(-30)),
            (key(1, 1), dec!(50)),
            (key(2, 2), dec!(-10)),
        ]);
        assert_eq!(ordered, shuffled);
        assert_eq!(ordered.total(), dec!(10));
    }

    #[test]
    fn empty_chain_total_is_zero() {
        let chain = VarianceChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.total(), Decimal::ZERO);
        assert_eq!(chain.cumulative_after(SubmissionId(1)), None);
    }
}
