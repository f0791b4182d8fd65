pub mod aggregator;
pub mod cache;
pub mod catalog;
pub mod detectors;
pub mod engine;
pub mod extract;
pub mod letter;
pub mod matcher;
pub mod report;

pub use aggregator::AuditAggregator;
pub use cache::AuditCache;
pub use catalog::{load_catalog, Catalog, CatalogError, CatalogHandle};
pub use engine::{audit, AuditEngine, AuditError};
pub use extract::{build_extractor, ExtractionError, JsonBillExtractor, TextExtractor};
pub use letter::{build_drafter, DraftError, LetterDrafter, LetterRequest, LetterTone, PatientInfo, TemplateLetterDrafter};
pub use matcher::ProcedureMatcher;
pub use report::{render_summary, write_issues_csv};
