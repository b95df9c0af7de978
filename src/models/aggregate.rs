use crate::models::issue::{IssueType, Severity};
use serde::{Deserialize, Serialize};

/// Debt of the issues live at one analysis, split by how they relate to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAggregate {
    /// Issues created at this analysis.
    pub new_debt: u64,
    /// Issues still open from earlier analyses.
    pub existing_debt: u64,
    /// Issues closed at this analysis.
    pub fixed_debt: u64,
    /// Live issues whose debt the server reported as unknown (summed as zero).
    pub unknown_debt_count: usize,
}

impl DebtAggregate {
    pub fn total(&self) -> u64 {
        self.new_debt + self.existing_debt + self.fixed_debt
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub blocker: u64,
    pub critical: u64,
    pub major: u64,
    pub minor: u64,
    pub info: u64,
}

impl SeverityBreakdown {
    pub fn add(&mut self, severity: Severity, minutes: u64) {
        *self.slot(severity) += minutes;
    }

    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Blocker => self.blocker,
            Severity::Critical => self.critical,
            Severity::Major => self.major,
            Severity::Minor => self.minor,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> u64 {
        self.blocker + self.critical + self.major + self.minor + self.info
    }

    pub fn merge(&mut self, other: &SeverityBreakdown) {
        for severity in Severity::DESCENDING {
            self.add(severity, other.get(severity));
        }
    }

    fn slot(&mut self, severity: Severity) -> &mut u64 {
        match severity {
            Severity::Blocker => &mut self.blocker,
            Severity::Critical => &mut self.critical,
            Severity::Major => &mut self.major,
            Severity::Minor => &mut self.minor,
            Severity::Info => &mut self.info,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub bug: u64,
    pub vulnerability: u64,
    pub code_smell: u64,
}

impl TypeBreakdown {
    pub fn add(&mut self, issue_type: IssueType, minutes: u64) {
        match issue_type {
            IssueType::Bug => self.bug += minutes,
            IssueType::Vulnerability => self.vulnerability += minutes,
            IssueType::CodeSmell => self.code_smell += minutes,
        }
    }

    pub fn get(&self, issue_type: IssueType) -> u64 {
        match issue_type {
            IssueType::Bug => self.bug,
            IssueType::Vulnerability => self.vulnerability,
            IssueType::CodeSmell => self.code_smell,
        }
    }

    pub fn total(&self) -> u64 {
        self.bug + self.vulnerability + self.code_smell
    }

    pub fn merge(&mut self, other: &TypeBreakdown) {
        for issue_type in IssueType::ALL {
            self.add(issue_type, other.get(issue_type));
        }
    }
}

/// Debt of one file at one analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDebt {
    pub total: u64,
    pub by_severity: SeverityBreakdown,
    pub by_type: TypeBreakdown,
}

impl ComponentDebt {
    pub fn add(&mut self, severity: Severity, issue_type: IssueType, minutes: u64) {
        self.total += minutes;
        self.by_severity.add(severity, minutes);
        self.by_type.add(issue_type, minutes);
    }

    /// Unknown debt is zero in every bucket, so the three views always agree.
    pub fn is_consistent(&self) -> bool {
        self.total == self.by_severity.total() && self.total == self.by_type.total()
    }
}

/// Five contiguous groups of a descending-ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quintiles<T> {
    pub groups: [Vec<T>; 5],
}

impl<T> Quintiles<T> {
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-group sum of `value`.
    pub fn sums<F>(&self, value: F) -> [f64; 5]
    where
        F: Fn(&T) -> f64,
    {
        let mut sums = [0.0; 5];
        for (slot, group) in sums.iter_mut().zip(self.groups.iter()) {
            *slot = group.iter().map(&value).sum();
        }
        sums
    }

    /// Items in their original order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.groups.iter().flatten()
    }
}
