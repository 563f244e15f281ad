mod session;

pub use session::{
    LeaderboardEntry, SessionRecord, SessionSummary, SessionType, UserProfile, UserStats,
};
