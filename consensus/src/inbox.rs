//! Per-process storage of received votes

use binvote_core::{Round, Value};
use dashmap::DashMap;
use tracing::trace;

/// Votes received by one process, grouped by that process's own round.
///
/// Every engine owns exactly one inbox. Appends to the same round are
/// serialized by the entry lock of the underlying map.
#[derive(Debug, Default)]
pub struct VoteInbox {
    rounds: DashMap<Round, Vec<Value>>,
}

impl VoteInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vote to `round`. Returns false if the value is not a vote.
    pub fn record(&self, round: Round, value: Value) -> bool {
        if !value.is_binary() {
            trace!("Ignoring non-binary value {} for round {}", value, round);
            return false;
        }

        self.rounds.entry(round).or_default().push(value);
        true
    }

    /// Snapshot of the votes received for `round`, in arrival order
    pub fn read(&self, round: Round) -> Vec<Value> {
        self.rounds
            .get(&round)
            .map(|votes| votes.clone())
            .unwrap_or_default()
    }

    /// Number of votes received for `round`
    pub fn len(&self, round: Round) -> usize {
        self.rounds.get(&round).map(|votes| votes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Drop a consumed round
    pub fn discard(&self, round: Round) {
        self.rounds.remove(&round);
    }

    pub fn clear(&self) {
        self.rounds.clear();
    }

    /// Rounds that currently hold votes, ascending
    pub fn rounds(&self) -> Vec<Round> {
        let mut rounds: Vec<Round> = self.rounds.iter().map(|entry| *entry.key()).collect();
        rounds.sort_unstable();
        rounds
    }
}
