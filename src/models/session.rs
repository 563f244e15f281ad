use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Focus => "focus",
            SessionType::ShortBreak => "short_break",
            SessionType::LongBreak => "long_break",
        }
    }
}

/// Immutable outcome of one completed Focus phase. Built exactly once at
/// phase completion and handed to persistence; the timer does not keep it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_seconds: u64,
    pub completed_at: DateTime<Utc>,
    pub distraction_minutes: u64,
    pub was_completed: bool,
}

/// One persisted session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub duration_seconds: u64,
    pub completed_at: DateTime<Utc>,
    pub session_type: SessionType,
    pub distraction_count: u64,
    pub was_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub total_study_seconds: u64,
    pub total_sessions: u64,
    pub current_streak: u64,
    pub longest_streak: u64,
    pub last_session_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub today_minutes: i64,
    pub today_sessions: i64,
    pub week_minutes: i64,
    pub month_minutes: i64,
    pub total_minutes: i64,
    pub total_sessions: i64,
    pub average_session_length: i64,
    pub streak: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub total_study_minutes: i64,
    pub total_sessions: i64,
    pub rank: i64,
}
