pub mod bill;
pub mod catalog;
pub mod issue;
pub mod money;
pub mod result;

pub use bill::{city_multiplier, Bill, HospitalType, LineItem, Region};
pub use catalog::{BenchmarkSource, CatalogEntry, MarketRateRange, ProcedureRow};
pub use issue::{Issue, IssueType, Severity};
pub use result::{AuditResult, IssueSummary, MatchResult, ScoredProcedure};
