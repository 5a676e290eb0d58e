//! JSON bodies exchanged on the enrollment HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response to `PUT /sign/{token}/{role}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub fingerprint: String,
    pub approved: bool,
}

/// One row of `GET /requests/{token}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestSummary {
    pub fingerprint: String,
    pub role: String,
    pub approved: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Response to `POST /approve/{token}/{fingerprint}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApproveResponse {
    pub fingerprint: String,
    pub approved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_summary_uses_snake_case_fields() {
        let summary = RequestSummary {
            fingerprint: "ab".into(),
            role: "agent,netagent".into(),
            approved: false,
            submitted_at: Utc::now(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["fingerprint"], "ab");
        assert_eq!(json["role"], "agent,netagent");
        assert_eq!(json["approved"], false);
        assert!(json.get("submitted_at").is_some());
    }
}
