//! Vote counting and the per-round decision rule

use binvote_core::Value;

/// What a process does at the end of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The threshold was met; the value is final
    Decided(Value),
    /// No decision; carry this value into the next round
    Provisional(Value),
}

impl RoundOutcome {
    pub fn value(&self) -> Value {
        match self {
            RoundOutcome::Decided(v) | RoundOutcome::Provisional(v) => *v,
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, RoundOutcome::Decided(_))
    }
}

/// Counts of 0 and 1 votes seen in a round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub zeros: usize,
    pub ones: usize,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut tally = Self::new();
        for vote in votes {
            tally.add(*vote);
        }
        tally
    }

    /// Count a vote (returns false if the value is not binary)
    pub fn add(&mut self, value: Value) -> bool {
        match value {
            Value::Zero => self.zeros += 1,
            Value::One => self.ones += 1,
            Value::Undetermined => return false,
        }
        true
    }

    /// Total votes
    pub fn total(&self) -> usize {
        self.zeros + self.ones
    }

    /// Value that may be decided this round, if any.
    ///
    /// Without fault tolerance this is a strict majority of the votes;
    /// otherwise one value needs at least `2F + 1` votes.
    pub fn majority_value(&self, fault_tolerance: usize) -> Option<Value> {
        if fault_tolerance == 0 {
            let total = self.total();
            if self.zeros > self.ones && self.zeros * 2 > total {
                return Some(Value::Zero);
            }
            if self.ones >= self.zeros && self.ones * 2 > total {
                return Some(Value::One);
            }
            return None;
        }

        let threshold = 2 * fault_tolerance + 1;
        if self.zeros >= threshold {
            return Some(Value::Zero);
        }
        if self.ones >= threshold {
            return Some(Value::One);
        }
        None
    }

    /// Plurality value, ties resolve to 1
    pub fn simple_majority(&self) -> Value {
        if self.ones >= self.zeros {
            Value::One
        } else {
            Value::Zero
        }
    }

    pub fn evaluate(&self, fault_tolerance: usize) -> RoundOutcome {
        match self.majority_value(fault_tolerance) {
            Some(value) => RoundOutcome::Decided(value),
            None => RoundOutcome::Provisional(self.simple_majority()),
        }
    }
}
