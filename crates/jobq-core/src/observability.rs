use serde::{Deserialize, Serialize};

use crate::domain::Status;

/// Number of entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub new: usize,
    pub hold: usize,
    pub submitted: usize,
    pub running: usize,
    pub success: usize,
    pub error: usize,
}

impl QueueCounts {
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::New => self.new,
            Status::Hold => self.hold,
            Status::Submitted => self.submitted,
            Status::Running => self.running,
            Status::Success => self.success,
            Status::Error => self.error,
        }
    }

    pub fn add(&mut self, status: Status, n: usize) {
        let slot = match status {
            Status::New => &mut self.new,
            Status::Hold => &mut self.hold,
            Status::Submitted => &mut self.submitted,
            Status::Running => &mut self.running,
            Status::Success => &mut self.success,
            Status::Error => &mut self.error,
        };
        *slot += n;
    }

    pub fn total(&self) -> usize {
        Status::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Non-zero counts in lifecycle order.
    pub fn non_zero(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        Status::ALL
            .into_iter()
            .map(|s| (s, self.get(s)))
            .filter(|(_, n)| *n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_total() {
        let mut counts = QueueCounts::default();
        counts.add(Status::New, 2);
        counts.add(Status::Error, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(
            counts.non_zero().collect::<Vec<_>>(),
            vec![(Status::New, 2), (Status::Error, 1)]
        );
    }
}
