// BookingService - live practice sessions, join requests and search.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::LegacyBehavior;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{DatabaseInterface, Document, DocumentQuery, Filter, FilterOp, Write};
use crate::infrastructure::viewer::ViewerContext;
use crate::models::booking::format_utc_string;
use crate::models::{
    BookingFormInput, BookingSearchParams, BookingSession, BookingStatus, BOOKINGS_COLLECTION,
};

/// Reacts to booking writes. Implementations handle their own failures; a
/// failing observer never fails the booking operation.
#[async_trait]
pub trait BookingObserver: Send + Sync {
    async fn on_booking_created(&self, session: &BookingSession);

    async fn on_booking_updated(&self, before: &BookingSession, after: &BookingSession);
}

#[derive(Clone)]
pub struct BookingService {
    db: Arc<dyn DatabaseInterface>,
    legacy: LegacyBehavior,
    observer: Option<Arc<dyn BookingObserver>>,
}

impl BookingService {
    pub fn new(db: Arc<dyn DatabaseInterface>, legacy: LegacyBehavior) -> Self {
        Self {
            db,
            legacy,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BookingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Field that receives accepted requesters.
    fn accepted_field(&self) -> &'static str {
        if self.legacy.accept_writes_user_ids {
            "userIds"
        } else {
            "participantIds"
        }
    }

    #[instrument(skip(self, vc, input), fields(request_id = %vc.request_id))]
    pub async fn post_booking_session(
        &self,
        vc: &ViewerContext,
        input: BookingFormInput,
    ) -> AppResult<BookingSession> {
        let owner = vc.require_user()?;
        if input.end_time <= input.start_time {
            return Err(AppError::Validation(
                "End time must be after start time.".to_string(),
            ));
        }

        let session = BookingSession {
            session_id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            participant_ids: Vec::new(),
            status: BookingStatus::Open,
            start_time: format_utc_string(&input.start_time),
            end_time: format_utc_string(&input.end_time),
            service: input.service,
            requests: Vec::new(),
            user_ids: Vec::new(),
            start_time_ms: input.start_time.timestamp_millis(),
            end_time_ms: input.end_time.timestamp_millis(),
        };

        self.db
            .commit_batch(vec![Write::create(BOOKINGS_COLLECTION, &session.session_id, &session)?])
            .await?;
        info!(session_id = %session.session_id, owner, "booking session posted");

        if let Some(observer) = &self.observer {
            observer.on_booking_created(&session).await;
        }
        Ok(session)
    }

    /// Only the owner may delete a session.
    pub async fn delete_booking_session(&self, vc: &ViewerContext, session_id: &str) -> AppResult<()> {
        let session = self.get_booking_session_info(session_id).await?;
        ensure_owner(vc, &session)?;
        self.db.delete(BOOKINGS_COLLECTION, session_id).await?;
        info!(session_id, "booking session deleted");
        Ok(())
    }

    pub async fn get_booking_session_info(&self, session_id: &str) -> AppResult<BookingSession> {
        let doc = self
            .db
            .get(BOOKINGS_COLLECTION, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking session {} not found", session_id)))?;
        decode_session(&doc)
    }

    /// Sessions the viewer owns or participates in.
    pub async fn get_cur_user_scheduled_sessions(&self, vc: &ViewerContext) -> AppResult<Vec<BookingSession>> {
        let user_id = vc.require_user()?;
        let docs = self
            .db
            .query(DocumentQuery::new(BOOKINGS_COLLECTION).any_of(vec![
                Filter::eq("owner", user_id),
                Filter::array_contains("participantIds", user_id),
            ]))
            .await?;
        docs.iter().map(decode_session).collect()
    }

    /// Open sessions of the given service whose window contains `time`.
    ///
    /// With `lexical_time_search` the window check compares the serialized
    /// UTC strings, which is not chronological across day names.
    pub async fn search_booking_sessions(&self, params: BookingSearchParams) -> AppResult<Vec<BookingSession>> {
        let query = DocumentQuery::new(BOOKINGS_COLLECTION)
            .where_eq("status", BookingStatus::Open.to_string())
            .where_eq("service", u8::from(params.service));

        let query = if self.legacy.lexical_time_search {
            let time = format_utc_string(&params.time);
            query
                .where_op("startTime", FilterOp::Lte, time.clone())
                .where_op("endTime", FilterOp::Gte, time)
        } else {
            let millis = params.time.timestamp_millis();
            query
                .where_op("startTimeMs", FilterOp::Lte, millis)
                .where_op("endTimeMs", FilterOp::Gte, millis)
        };

        let docs = self.db.query(query).await?;
        docs.iter().map(decode_session).collect()
    }

    /// Add the viewer to the session's request list (set-union).
    pub async fn request_to_join_booking(&self, vc: &ViewerContext, session_id: &str) -> AppResult<BookingSession> {
        let user_id = vc.require_user()?;
        let before = self.get_booking_session_info(session_id).await?;
        if before.owner == user_id {
            return Err(AppError::Validation(
                "You cannot request to join your own session.".to_string(),
            ));
        }

        self.db
            .commit_batch(vec![Write::array_union(
                BOOKINGS_COLLECTION,
                session_id,
                "requests",
                vec![json!(user_id)],
            )])
            .await?;

        self.after_update(before).await
    }

    /// Move `user_id` from `requests` into the accepted list.
    pub async fn accept_booking_request(
        &self,
        vc: &ViewerContext,
        session_id: &str,
        user_id: &str,
    ) -> AppResult<BookingSession> {
        let before = self.get_booking_session_info(session_id).await?;
        ensure_owner(vc, &before)?;

        self.db
            .commit_batch(vec![
                Write::array_union(BOOKINGS_COLLECTION, session_id, self.accepted_field(), vec![json!(user_id)]),
                Write::array_remove(BOOKINGS_COLLECTION, session_id, "requests", vec![json!(user_id)]),
            ])
            .await?;
        info!(session_id, user_id, field = self.accepted_field(), "booking request accepted");

        self.after_update(before).await
    }

    pub async fn reject_booking_request(
        &self,
        vc: &ViewerContext,
        session_id: &str,
        user_id: &str,
    ) -> AppResult<BookingSession> {
        let before = self.get_booking_session_info(session_id).await?;
        ensure_owner(vc, &before)?;

        self.db
            .commit_batch(vec![Write::array_remove(
                BOOKINGS_COLLECTION,
                session_id,
                "requests",
                vec![json!(user_id)],
            )])
            .await?;

        self.after_update(before).await
    }

    async fn after_update(&self, before: BookingSession) -> AppResult<BookingSession> {
        let after = self.get_booking_session_info(&before.session_id).await?;
        if let Some(observer) = &self.observer {
            observer.on_booking_updated(&before, &after).await;
        }
        Ok(after)
    }
}

fn decode_session(doc: &Document) -> AppResult<BookingSession> {
    let mut session: BookingSession = doc.decode()?;
    session.session_id = doc.id.clone();
    Ok(session)
}

fn ensure_owner(vc: &ViewerContext, session: &BookingSession) -> AppResult<()> {
    if vc.require_user()? != session.owner {
        return Err(AppError::Forbidden(
            "Only the session owner can manage this session.".to_string(),
        ));
    }
    Ok(())
}
