use chrono::{DateTime, Utc};
use serde::Serialize;

/// Activity type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RequestReceived,
    MessageSent,
    SessionCreated,
    SessionExpired,
    SlidingWindowEnforced,
    TokenOverflow,
    LlmError,
    ReportGenerated,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::MessageSent => "message_sent",
            Self::SessionCreated => "session_created",
            Self::SessionExpired => "session_expired",
            Self::SlidingWindowEnforced => "sliding_window_enforced",
            Self::TokenOverflow => "token_overflow",
            Self::LlmError => "llm_error",
            Self::ReportGenerated => "report_generated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// One conversation event
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub session_id: String,
    pub request_id: Option<String>,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    pub token_count: Option<usize>,
    pub history_included: Option<usize>,
    pub turns_trimmed: Option<usize>,

    pub processing_time_ms: Option<u64>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn builder(session_id: impl Into<String>, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(session_id.into(), activity_type)
    }
}

pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    fn new(session_id: String, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                session_id,
                request_id: None,
                activity_type,
                activity_status: ActivityStatus::Info,
                token_count: None,
                history_included: None,
                turns_trimmed: None,
                processing_time_ms: None,
                error_message: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.log.request_id = Some(id.into());
        self
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn token_count(mut self, count: usize) -> Self {
        self.log.token_count = Some(count);
        self
    }

    pub fn history_included(mut self, turns: usize) -> Self {
        self.log.history_included = Some(turns);
        self
    }

    pub fn turns_trimmed(mut self, turns: usize) -> Self {
        self.log.turns_trimmed = Some(turns);
        self
    }

    pub fn processing_time_ms(mut self, ms: u64) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}
