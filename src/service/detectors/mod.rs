use crate::config::AuditPolicy;
use crate::models::{Bill, Issue, MatchResult};

pub mod arithmetic;
pub mod code;
pub mod duplicate;
pub mod overcharge;
pub mod tax;
pub mod validation;

pub use arithmetic::ArithmeticDetector;
pub use code::CodeDetector;
pub use duplicate::DuplicateDetector;
pub use overcharge::OverchargeDetector;
pub use tax::TaxDetector;
pub use validation::ValidationDetector;

/// 问题检测器：纯函数，互不依赖，最终顺序由聚合器决定
pub trait IssueDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, bill: &Bill, matches: &[MatchResult]) -> Vec<Issue>;
}

/// 默认检测器组合 (即检出顺序)
pub fn default_detectors(policy: &AuditPolicy) -> Vec<Box<dyn IssueDetector>> {
    vec![
        Box::new(ValidationDetector::new(policy)),
        Box::new(DuplicateDetector::new(policy)),
        Box::new(ArithmeticDetector::new(policy)),
        Box::new(CodeDetector),
        Box::new(OverchargeDetector::new(policy)),
        Box::new(TaxDetector::new(policy)),
    ]
}
