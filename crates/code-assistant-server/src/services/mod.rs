pub mod conversation;
pub mod llm_service;
pub mod report;

pub use llm_service::LlmService;
pub use report::{ReportFormat, ReportRenderer};
