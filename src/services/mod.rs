// Domain services - each owns one collection family and its consistency rules.

pub mod analytics;
pub mod auth;
pub mod booking;
pub mod community;
pub mod connection;
pub mod profile;
pub mod rating;

pub use analytics::AnalyticsService;
pub use auth::AuthSession;
pub use booking::{BookingObserver, BookingService};
pub use community::CommunityService;
pub use connection::ConnectionService;
pub use profile::ProfileService;
pub use rating::{RatingService, RATING_COMMIT_ATTEMPTS};
