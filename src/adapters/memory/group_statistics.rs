//! Running-mean group statistics.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::domain::models::ReviewId;
use crate::domain::ports::GroupStatistics;

#[derive(Debug, Clone, Copy, Default)]
struct Aggregate {
    sum: u64,
    count: u64,
}

impl Aggregate {
    fn add(&mut self, score: u32) {
        self.sum = self.sum.saturating_add(u64::from(score));
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Groups {
    aggregates: HashMap<u32, Aggregate>,
    contributors: HashSet<ReviewId>,
}

/// Arithmetic mean per group, rounded down.
#[derive(Debug, Default)]
pub struct RunningMeanGroupStatistics {
    groups: RwLock<Groups>,
}

impl RunningMeanGroupStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStatistics for RunningMeanGroupStatistics {
    fn record_score(&self, group: u32, score: u32) {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups.aggregates.entry(group).or_default().add(score);
    }

    fn record_contribution(&self, review_id: ReviewId, group: u32, score: u32) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        if !groups.contributors.insert(review_id) {
            return false;
        }
        groups.aggregates.entry(group).or_default().add(score);
        true
    }

    fn has_contributed(&self, review_id: ReviewId) -> bool {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.contributors.contains(&review_id)
    }

    fn average(&self, group: u32) -> Option<u32> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.aggregates.get(&group).and_then(|aggregate| {
            if aggregate.count == 0 {
                return None;
            }
            // Mean of u32 values always fits back into u32.
            u32::try_from(aggregate.sum / aggregate.count).ok()
        })
    }

    fn sample_count(&self, group: u32) -> u64 {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.aggregates.get(&group).map_or(0, |aggregate| aggregate.count)
    }
}
