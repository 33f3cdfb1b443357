use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Succeed,
    Failed,
}

/// Frame pushed to a streaming (CDC) client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdcResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl CdcResponse {
    pub fn succeed(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResponseStatus::Succeed,
            error_code: None,
            error_message: None,
        }
    }

    /// A failure frame not tied to any client request.
    pub fn failed(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            status: ResponseStatus::Failed,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }
}
