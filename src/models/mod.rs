// Document models - one module per collection family.

pub mod analytics;
pub mod booking;
pub mod community;
pub mod connection;
pub mod profile;
pub mod rating;

pub use analytics::{AnalyticsEvent, EngagementSummary, SuccessRate, UserStreak};
pub use booking::{
    BookingFormInput, BookingSearchParams, BookingSession, BookingStatus, ServiceType,
};
pub use community::{Badge, Challenge, ChallengeProgress, LeaderboardEntry, LeaderboardScope, Post};
pub use connection::{Block, Connection, FriendRequest, RequestStatus};
pub use profile::{ProfilePatch, UserProfile, Voice};
pub use rating::{Rating, ReputationSummary};

// Collection names shared with the web client.
pub const USERS_COLLECTION: &str = "users";
pub const BOOKINGS_COLLECTION: &str = "bookings";
pub const FRIEND_REQUESTS_COLLECTION: &str = "friendRequests";
pub const FRIEND_REQUEST_GUARDS_COLLECTION: &str = "friendRequestGuards";
pub const CONNECTIONS_COLLECTION: &str = "connections";
pub const BLOCKS_COLLECTION: &str = "blocks";
pub const REPUTATION_COLLECTION: &str = "reputation";
pub const ANALYTICS_COLLECTION: &str = "community_analytics";
pub const POSTS_COLLECTION: &str = "posts";
pub const BADGES_COLLECTION: &str = "badges";
pub const CHALLENGES_COLLECTION: &str = "challenges";
pub const CHALLENGE_PROGRESS_COLLECTION: &str = "challenge_progress";

/// Ratings live in a per-user subcollection.
pub fn ratings_collection(user_id: &str) -> String {
    format!("ratings/{}/items", user_id)
}

pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Directed edge id, e.g. `alice_bob`.
pub fn pair_id(a: &str, b: &str) -> String {
    format!("{}_{}", a, b)
}

/// Id that is the same for `(a, b)` and `(b, a)`.
pub fn unordered_pair_id(a: &str, b: &str) -> String {
    if a <= b {
        pair_id(a, b)
    } else {
        pair_id(b, a)
    }
}
