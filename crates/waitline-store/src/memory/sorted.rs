//! Score-ordered member set.
//!
//! Orders by `(score, member)` so equal scores fall back to lexicographic
//! member order, the same tie-break a Redis sorted set applies.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub(crate) struct ScoredSet {
    order: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl ScoredSet {
    /// Insert only if absent. Returns whether the member was added.
    pub fn insert_nx(&mut self, member: &str, score: i64) -> bool {
        if self.scores.contains_key(member) {
            return false;
        }
        self.order.insert((score, member.to_string()));
        self.scores.insert(member.to_string(), score);
        true
    }

    /// Insert or move to a new score.
    pub fn upsert(&mut self, member: &str, score: i64) {
        self.remove(member);
        self.order.insert((score, member.to_string()));
        self.scores.insert(member.to_string(), score);
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    /// 0-based position in score order.
    pub fn rank(&self, member: &str) -> Option<u64> {
        let score = *self.scores.get(member)?;
        let key = (score, member.to_string());
        Some(self.order.range(..key).count() as u64)
    }

    pub fn len(&self) -> u64 {
        self.order.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove and return up to `n` lowest-scored members.
    pub fn pop_min(&mut self, n: u64) -> Vec<String> {
        let mut popped = Vec::new();
        while (popped.len() as u64) < n {
            let Some((_, member)) = self.order.pop_first() else {
                break;
            };
            self.scores.remove(&member);
            popped.push(member);
        }
        popped
    }

    /// Members scored at or below `max`, lowest first.
    pub fn at_or_below(&self, max: i64) -> Vec<String> {
        self.order
            .iter()
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect()
    }
}
