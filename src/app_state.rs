use std::sync::Arc;

use crate::{
    ai::{FeedbackService, GeminiClient, GenerativeModel, ModelChain, QuestionGenerator},
    config::Config,
    infrastructure::{DatabaseInterface, SqliteDatabase},
    notifications::{CloudTasksClient, FcmClient, MessagingProvider, NotificationDispatcher, TaskQueue},
    services::{
        AnalyticsService, AuthSession, BookingService, CommunityService, ConnectionService,
        ProfileService, RatingService,
    },
};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn DatabaseInterface>,
    pub profiles: Arc<ProfileService>,
    pub auth: AuthSession,
    pub connections: Arc<ConnectionService>,
    pub ratings: Arc<RatingService>,
    pub bookings: Arc<BookingService>,
    pub analytics: Arc<AnalyticsService>,
    pub community: Arc<CommunityService>,
    pub notifications: Arc<NotificationDispatcher>,
    pub questions: QuestionGenerator,
    pub feedback: FeedbackService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let database = SqliteDatabase::connect(&config.database.url).await?;

        // External providers
        let messaging = Arc::new(FcmClient::new(&config.messaging)?);
        let tasks = Arc::new(CloudTasksClient::new(&config.tasks)?);
        let model = Arc::new(GeminiClient::new(&config.ai)?);
        if config.ai.api_key.is_empty() {
            tracing::warn!("No AI API key configured, coaching uses fallback content");
        }

        Ok(Self::with_providers(config, Arc::new(database), messaging, tasks, model))
    }

    /// Wire every service over the given store and providers.
    pub fn with_providers(
        config: Config,
        db: Arc<dyn DatabaseInterface>,
        messaging: Arc<dyn MessagingProvider>,
        tasks: Arc<dyn TaskQueue>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let profiles = Arc::new(ProfileService::new(db.clone(), config.legacy));
        let notifications = Arc::new(NotificationDispatcher::new(messaging, tasks, profiles.clone()));
        let connections = Arc::new(ConnectionService::new(db.clone()));
        let ratings = Arc::new(RatingService::new(db.clone()));
        let analytics = Arc::new(AnalyticsService::new(db.clone()));
        let bookings = Arc::new(
            BookingService::new(db.clone(), config.legacy).with_observer(notifications.clone()),
        );
        let community = Arc::new(CommunityService::new(
            db.clone(),
            connections.clone(),
            ratings.clone(),
            analytics.clone(),
        ));

        let chain = Arc::new(ModelChain::from_config(model, &config.ai));

        Self {
            auth: AuthSession::new(profiles.clone()),
            questions: QuestionGenerator::new(chain.clone()),
            feedback: FeedbackService::new(chain),
            config,
            db,
            profiles,
            connections,
            ratings,
            bookings,
            analytics,
            community,
            notifications,
        }
    }
}
