use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RequestReceived,
    IntentClassified,
    RetrievalExecuted,
    RetrievalError,
    CompositionError,
    HistoryReset,
    SessionCreated,
    MessageSent,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::IntentClassified => "intent_classified",
            Self::RetrievalExecuted => "retrieval_executed",
            Self::RetrievalError => "retrieval_error",
            Self::CompositionError => "composition_error",
            Self::HistoryReset => "history_reset",
            Self::SessionCreated => "session_created",
            Self::MessageSent => "message_sent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

/// One row of `tbl_assistant_activity_logs`
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub session_id: String,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    pub intent: Option<String>,
    pub message_content: Option<String>,
    pub response_content: Option<String>,

    pub product_count: Option<i32>,
    pub max_price: Option<f64>,

    pub processing_time_ms: Option<i32>,
    pub llm_call_duration_ms: Option<i32>,
    pub retrieval_duration_ms: Option<i32>,

    pub error_message: Option<String>,
    pub error_type: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn builder(session_id: impl Into<String>, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(session_id, activity_type)
    }
}

pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(session_id: impl Into<String>, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                session_id: session_id.into(),
                activity_type,
                activity_status: ActivityStatus::Success,
                intent: None,
                message_content: None,
                response_content: None,
                product_count: None,
                max_price: None,
                processing_time_ms: None,
                llm_call_duration_ms: None,
                retrieval_duration_ms: None,
                error_message: None,
                error_type: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.log.intent = Some(intent.into());
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn product_count(mut self, count: usize) -> Self {
        self.log.product_count = Some(i32::try_from(count).unwrap_or(i32::MAX));
        self
    }

    pub fn max_price(mut self, price: Option<f64>) -> Self {
        self.log.max_price = price;
        self
    }

    pub fn processing_time(mut self, ms: u128) -> Self {
        self.log.processing_time_ms = Some(clamp_ms(ms));
        self
    }

    pub fn llm_duration(mut self, ms: u128) -> Self {
        self.log.llm_call_duration_ms = Some(clamp_ms(ms));
        self
    }

    pub fn retrieval_duration(mut self, ms: u128) -> Self {
        self.log.retrieval_duration_ms = Some(clamp_ms(ms));
        self
    }

    /// Marks the entry as an error
    pub fn error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.error_type = Some(error_type.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}

fn clamp_ms(ms: u128) -> i32 {
    i32::try_from(ms).unwrap_or(i32::MAX)
}
