pub mod aggregate;
pub mod analysis;
pub mod issue;
pub mod ledger;
pub mod report;
