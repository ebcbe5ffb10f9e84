use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Practice service offered in a session. Stored as its numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ServiceType {
    Interview = 0,
    Speech = 1,
}

impl From<ServiceType> for u8 {
    fn from(service: ServiceType) -> Self {
        service as u8
    }
}

impl TryFrom<u8> for ServiceType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServiceType::Interview),
            1 => Ok(ServiceType::Speech),
            other => Err(format!("unknown service type {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Open,
    Closed,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Open => "Open",
            BookingStatus::Closed => "Closed",
            BookingStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSession {
    #[serde(default)]
    pub session_id: String,
    pub owner: String,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    pub status: BookingStatus,
    /// Serialized UTC string, e.g. `Tue, 14 Oct 2025 09:00:00 GMT`.
    pub start_time: String,
    pub end_time: String,
    pub service: ServiceType,
    #[serde(default)]
    pub requests: Vec<String>,
    /// Accepted requesters while bookings still write this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub start_time_ms: i64,
    #[serde(default)]
    pub end_time_ms: i64,
}

impl BookingSession {
    /// Everyone accepted into the session, whichever field holds them.
    pub fn accepted_users(&self) -> Vec<String> {
        let mut users = self.participant_ids.clone();
        for id in &self.user_ids {
            if !users.contains(id) {
                users.push(id.clone());
            }
        }
        users
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingFormInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub service: ServiceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSearchParams {
    pub time: DateTime<Utc>,
    pub service: ServiceType,
}

/// Format an instant the way the web client serializes session times.
pub fn format_utc_string(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_service_type_is_numeric() {
        assert_eq!(serde_json::to_value(ServiceType::Speech).unwrap(), json!(1));
        let parsed: ServiceType = serde_json::from_value(json!(0)).unwrap();
        assert_eq!(parsed, ServiceType::Interview);
        assert!(serde_json::from_value::<ServiceType>(json!(7)).is_err());
    }

    #[test]
    fn test_format_utc_string() {
        let t = Utc.with_ymd_and_hms(2025, 10, 14, 9, 5, 0).unwrap();
        assert_eq!(format_utc_string(&t), "Tue, 14 Oct 2025 09:05:00 GMT");
    }

    #[test]
    fn test_accepted_users_merges_fields() {
        let session = BookingSession {
            session_id: "s".into(),
            owner: "o".into(),
            participant_ids: vec!["a".into()],
            status: BookingStatus::Open,
            start_time: String::new(),
            end_time: String::new(),
            service: ServiceType::Interview,
            requests: vec![],
            user_ids: vec!["a".into(), "b".into()],
            start_time_ms: 0,
            end_time_ms: 0,
        };
        assert_eq!(session.accepted_users(), vec!["a".to_string(), "b".to_string()]);
    }
}
