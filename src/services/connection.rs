// ConnectionService - friend requests, two-row friendships and blocks.
//
// Friendships are stored as two directed rows so "list my friends" is a single
// equality filter. A pending request also holds a guard document keyed by the
// unordered user pair; the guard is created in the same batch as the request,
// which turns a racing duplicate request into a conflict.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    decode_all, fields, DatabaseInterface, DocumentQuery, Write,
};
use crate::models::{
    current_time_millis, pair_id, unordered_pair_id, Block, Connection, FriendRequest,
    RequestStatus, BLOCKS_COLLECTION, CONNECTIONS_COLLECTION, FRIEND_REQUESTS_COLLECTION,
    FRIEND_REQUEST_GUARDS_COLLECTION,
};

#[derive(Clone)]
pub struct ConnectionService {
    db: Arc<dyn DatabaseInterface>,
}

impl ConnectionService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Whether `user_id` has blocked `other_user_id`.
    pub async fn is_blocked(&self, user_id: &str, other_user_id: &str) -> AppResult<bool> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(BLOCKS_COLLECTION)
                    .where_eq("blockerId", user_id)
                    .where_eq("blockedId", other_user_id)
                    .limit(1),
            )
            .await?;
        Ok(!docs.is_empty())
    }

    pub async fn is_connected(&self, user_id: &str, friend_id: &str) -> AppResult<bool> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(CONNECTIONS_COLLECTION)
                    .where_eq("userId", user_id)
                    .where_eq("friendId", friend_id)
                    .limit(1),
            )
            .await?;
        Ok(!docs.is_empty())
    }

    async fn pending_between(&self, from_user_id: &str, to_user_id: &str) -> AppResult<Vec<FriendRequest>> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(FRIEND_REQUESTS_COLLECTION)
                    .where_eq("fromUserId", from_user_id)
                    .where_eq("toUserId", to_user_id)
                    .where_eq("status", RequestStatus::Pending.as_str()),
            )
            .await?;
        decode_all(&docs)
    }

    pub async fn send_friend_request(&self, from_user_id: &str, to_user_id: &str) -> AppResult<FriendRequest> {
        if from_user_id == to_user_id {
            return Err(AppError::Validation(
                "Users cannot send requests to themselves.".to_string(),
            ));
        }

        if self.is_blocked(from_user_id, to_user_id).await?
            || self.is_blocked(to_user_id, from_user_id).await?
        {
            return Err(AppError::Forbidden(
                "Cannot send request: user is blocked.".to_string(),
            ));
        }

        if !self.pending_between(from_user_id, to_user_id).await?.is_empty() {
            return Err(AppError::Conflict("Friend request already pending.".to_string()));
        }
        if !self.pending_between(to_user_id, from_user_id).await?.is_empty() {
            return Err(AppError::Conflict(
                "A request from the other user is already pending.".to_string(),
            ));
        }
        if self.is_connected(from_user_id, to_user_id).await? {
            return Err(AppError::Conflict("Users are already connected.".to_string()));
        }

        let request = FriendRequest {
            id: Uuid::new_v4().to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            status: RequestStatus::Pending,
            created_at: current_time_millis(),
        };
        let guard = json!({
            "requestId": request.id,
            "fromUserId": from_user_id,
            "toUserId": to_user_id,
        });

        let writes = vec![
            Write::create(FRIEND_REQUESTS_COLLECTION, &request.id, &request)?,
            Write::create(
                FRIEND_REQUEST_GUARDS_COLLECTION,
                &unordered_pair_id(from_user_id, to_user_id),
                guard,
            )?,
        ];

        match self.db.commit_batch(writes).await {
            Ok(()) => {
                info!(from = from_user_id, to = to_user_id, request_id = %request.id, "friend request sent");
                Ok(request)
            }
            Err(AppError::Conflict(_)) => {
                warn!(from = from_user_id, to = to_user_id, "concurrent friend request rejected");
                Err(AppError::Conflict("Friend request already pending.".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every pending request in this exact direction. No-op if none.
    pub async fn cancel_friend_request(&self, from_user_id: &str, to_user_id: &str) -> AppResult<()> {
        let pending = self.pending_between(from_user_id, to_user_id).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut writes: Vec<Write> = pending
            .iter()
            .map(|r| Write::delete(FRIEND_REQUESTS_COLLECTION, &r.id))
            .collect();
        writes.push(Write::delete(
            FRIEND_REQUEST_GUARDS_COLLECTION,
            &unordered_pair_id(from_user_id, to_user_id),
        ));
        self.db.commit_batch(writes).await
    }

    /// Load a pending request addressed to `viewer_id`.
    async fn load_pending(&self, viewer_id: &str, request_id: &str) -> AppResult<(FriendRequest, i64)> {
        let doc = self
            .db
            .get(FRIEND_REQUESTS_COLLECTION, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found.".to_string()))?;
        let request: FriendRequest = doc.decode()?;
        if request.to_user_id != viewer_id {
            return Err(AppError::Forbidden(
                "Only the recipient can answer a friend request.".to_string(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict("Friend request is not pending.".to_string()));
        }
        Ok((request, doc.version))
    }

    async fn blocked_either_way(&self, a: &str, b: &str) -> AppResult<bool> {
        Ok(self.is_blocked(a, b).await? || self.is_blocked(b, a).await?)
    }

    /// Mark the request accepted and write both connection rows atomically.
    /// Only the recipient may accept, and never across a block.
    pub async fn accept_friend_request(&self, viewer_id: &str, request_id: &str) -> AppResult<()> {
        let (request, version) = self.load_pending(viewer_id, request_id).await?;
        if self
            .blocked_either_way(&request.from_user_id, &request.to_user_id)
            .await?
        {
            return Err(AppError::Forbidden(
                "Cannot accept request: user is blocked.".to_string(),
            ));
        }
        let now = current_time_millis();

        let forward = Connection {
            id: pair_id(&request.from_user_id, &request.to_user_id),
            user_id: request.from_user_id.clone(),
            friend_id: request.to_user_id.clone(),
            created_at: now,
        };
        let reverse = Connection {
            id: pair_id(&request.to_user_id, &request.from_user_id),
            user_id: request.to_user_id.clone(),
            friend_id: request.from_user_id.clone(),
            created_at: now,
        };

        let writes = vec![
            Write::update(
                FRIEND_REQUESTS_COLLECTION,
                request_id,
                fields([("status", json!(RequestStatus::Accepted.as_str()))]),
            )
            .if_version(version),
            Write::set(CONNECTIONS_COLLECTION, &forward.id, &forward)?,
            Write::set(CONNECTIONS_COLLECTION, &reverse.id, &reverse)?,
            Write::delete(
                FRIEND_REQUEST_GUARDS_COLLECTION,
                &unordered_pair_id(&request.from_user_id, &request.to_user_id),
            ),
            // Absence checks: a block committed since the read aborts the batch.
            Write::delete(BLOCKS_COLLECTION, &pair_id(&request.from_user_id, &request.to_user_id))
                .if_not_exists(),
            Write::delete(BLOCKS_COLLECTION, &pair_id(&request.to_user_id, &request.from_user_id))
                .if_not_exists(),
        ];

        if let Err(e) = self.db.commit_batch(writes).await {
            if matches!(e, AppError::Conflict(_))
                && self
                    .blocked_either_way(&request.from_user_id, &request.to_user_id)
                    .await?
            {
                return Err(AppError::Forbidden(
                    "Cannot accept request: user is blocked.".to_string(),
                ));
            }
            return Err(not_pending_on_conflict(e));
        }
        info!(request_id, from = %request.from_user_id, to = %request.to_user_id, "friend request accepted");
        Ok(())
    }

    pub async fn reject_friend_request(&self, viewer_id: &str, request_id: &str) -> AppResult<()> {
        let (request, version) = self.load_pending(viewer_id, request_id).await?;

        let writes = vec![
            Write::update(
                FRIEND_REQUESTS_COLLECTION,
                request_id,
                fields([("status", json!(RequestStatus::Rejected.as_str()))]),
            )
            .if_version(version),
            Write::delete(
                FRIEND_REQUEST_GUARDS_COLLECTION,
                &unordered_pair_id(&request.from_user_id, &request.to_user_id),
            ),
        ];

        self.db.commit_batch(writes).await.map_err(not_pending_on_conflict)
    }

    /// Block a user and tear down the friendship in both directions.
    pub async fn block_user(&self, blocker_id: &str, blocked_id: &str) -> AppResult<()> {
        if blocker_id == blocked_id {
            return Err(AppError::Validation("You cannot block yourself.".to_string()));
        }
        if self.is_blocked(blocker_id, blocked_id).await? {
            return Err(AppError::Conflict("User already blocked.".to_string()));
        }

        let block = Block {
            id: pair_id(blocker_id, blocked_id),
            blocker_id: blocker_id.to_string(),
            blocked_id: blocked_id.to_string(),
            created_at: current_time_millis(),
        };

        let writes = vec![
            Write::create(BLOCKS_COLLECTION, &block.id, &block)?,
            Write::delete(CONNECTIONS_COLLECTION, &pair_id(blocker_id, blocked_id)),
            Write::delete(CONNECTIONS_COLLECTION, &pair_id(blocked_id, blocker_id)),
        ];

        match self.db.commit_batch(writes).await {
            Ok(()) => {
                info!(blocker = blocker_id, blocked = blocked_id, "user blocked");
                Ok(())
            }
            Err(AppError::Conflict(_)) => Err(AppError::Conflict("User already blocked.".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Remove every matching block row. No-op if none.
    pub async fn unblock_user(&self, blocker_id: &str, blocked_id: &str) -> AppResult<()> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(BLOCKS_COLLECTION)
                    .where_eq("blockerId", blocker_id)
                    .where_eq("blockedId", blocked_id),
            )
            .await?;
        if docs.is_empty() {
            return Ok(());
        }

        let writes = docs
            .iter()
            .map(|doc| Write::delete(BLOCKS_COLLECTION, &doc.id))
            .collect();
        self.db.commit_batch(writes).await
    }

    /// Remove one direction of a friendship.
    pub async fn remove_connection(&self, user_id: &str, friend_id: &str) -> AppResult<()> {
        self.db.delete(CONNECTIONS_COLLECTION, &pair_id(user_id, friend_id)).await?;
        Ok(())
    }

    /// Remove both directions of a friendship atomically.
    pub async fn unfriend(&self, user_id: &str, friend_id: &str) -> AppResult<()> {
        self.db
            .commit_batch(vec![
                Write::delete(CONNECTIONS_COLLECTION, &pair_id(user_id, friend_id)),
                Write::delete(CONNECTIONS_COLLECTION, &pair_id(friend_id, user_id)),
            ])
            .await
    }

    pub async fn get_connections(&self, user_id: &str) -> AppResult<Vec<Connection>> {
        let docs = self
            .db
            .query(DocumentQuery::new(CONNECTIONS_COLLECTION).where_eq("userId", user_id))
            .await?;
        decode_all(&docs)
    }

    pub async fn friend_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .get_connections(user_id)
            .await?
            .into_iter()
            .map(|c| c.friend_id)
            .collect())
    }

    /// Pending requests addressed to `user_id`.
    pub async fn get_pending_requests(&self, user_id: &str) -> AppResult<Vec<FriendRequest>> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(FRIEND_REQUESTS_COLLECTION)
                    .where_eq("toUserId", user_id)
                    .where_eq("status", RequestStatus::Pending.as_str()),
            )
            .await?;
        decode_all(&docs)
    }

    /// Pending requests sent by `user_id`.
    pub async fn get_outgoing_requests(&self, user_id: &str) -> AppResult<Vec<FriendRequest>> {
        let docs = self
            .db
            .query(
                DocumentQuery::new(FRIEND_REQUESTS_COLLECTION)
                    .where_eq("fromUserId", user_id)
                    .where_eq("status", RequestStatus::Pending.as_str()),
            )
            .await?;
        decode_all(&docs)
    }
}

fn not_pending_on_conflict(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) | AppError::NotFound(_) => {
            AppError::Conflict("Friend request is not pending.".to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SqliteDatabase;

    async fn service() -> ConnectionService {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        ConnectionService::new(Arc::new(db))
    }

    async fn befriend(svc: &ConnectionService, a: &str, b: &str) {
        let request = svc.send_friend_request(a, b).await.unwrap();
        svc.accept_friend_request(b, &request.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_shows_up_as_pending() {
        let svc = service().await;
        svc.send_friend_request("alice", "bob").await.unwrap();

        let pending = svc.get_pending_requests("bob").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].from_user_id, "alice");
        assert_eq!(pending[0].status, RequestStatus::Pending);

        let outgoing = svc.get_outgoing_requests("alice").await.unwrap();
        assert_eq!(outgoing.len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_self_is_rejected() {
        let svc = service().await;
        let err = svc.send_friend_request("alice", "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_and_opposite_requests_conflict() {
        let svc = service().await;
        svc.send_friend_request("alice", "bob").await.unwrap();

        let dup = svc.send_friend_request("alice", "bob").await.unwrap_err();
        assert_eq!(dup.to_string(), "Conflict: Friend request already pending.");

        let opposite = svc.send_friend_request("bob", "alice").await.unwrap_err();
        assert_eq!(
            opposite.to_string(),
            "Conflict: A request from the other user is already pending."
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_produce_one_pending_row() {
        let svc = service().await;
        let (a, b) = tokio::join!(
            svc.send_friend_request("alice", "bob"),
            svc.send_friend_request("alice", "bob")
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(AppError::Conflict(_))));
        assert_eq!(svc.get_pending_requests("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_users_cannot_request() {
        let svc = service().await;
        svc.block_user("bob", "alice").await.unwrap();

        let err = svc.send_friend_request("alice", "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_accept_creates_two_rows_and_second_accept_fails() {
        let svc = service().await;
        let request = svc.send_friend_request("alice", "bob").await.unwrap();
        svc.accept_friend_request("bob", &request.id).await.unwrap();

        let err = svc.accept_friend_request("bob", &request.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Conflict: Friend request is not pending.");

        let alice = svc.get_connections("alice").await.unwrap();
        let bob = svc.get_connections("bob").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert_eq!(alice[0].friend_id, "bob");
        assert_eq!(bob[0].friend_id, "alice");
        assert!(svc.get_pending_requests("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_recipient_can_answer_request() {
        let svc = service().await;
        let request = svc.send_friend_request("alice", "bob").await.unwrap();

        for viewer in ["alice", "mallory"] {
            let err = svc.accept_friend_request(viewer, &request.id).await.unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
            let err = svc.reject_friend_request(viewer, &request.id).await.unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
        assert!(!svc.is_connected("alice", "bob").await.unwrap());
        assert_eq!(svc.get_pending_requests("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_block_then_accept_keeps_users_apart() {
        let svc = service().await;
        let request = svc.send_friend_request("alice", "bob").await.unwrap();
        svc.block_user("alice", "bob").await.unwrap();

        let err = svc.accept_friend_request("bob", &request.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Cannot accept request: user is blocked.");
        assert!(!svc.is_connected("alice", "bob").await.unwrap());
        assert!(!svc.is_connected("bob", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_accept_missing_request() {
        let svc = service().await;
        let err = svc.accept_friend_request("bob", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: Friend request not found.");
    }

    #[tokio::test]
    async fn test_already_connected_conflicts() {
        let svc = service().await;
        befriend(&svc, "alice", "bob").await;
        let err = svc.send_friend_request("bob", "alice").await.unwrap_err();
        assert_eq!(err.to_string(), "Conflict: Users are already connected.");
    }

    #[tokio::test]
    async fn test_reject_then_resend() {
        let svc = service().await;
        let request = svc.send_friend_request("alice", "bob").await.unwrap();
        svc.reject_friend_request("bob", &request.id).await.unwrap();
        assert!(svc.reject_friend_request("bob", &request.id).await.is_err());

        // The pair guard is released on reject.
        svc.send_friend_request("alice", "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_removes_pending() {
        let svc = service().await;
        svc.send_friend_request("alice", "bob").await.unwrap();
        svc.cancel_friend_request("alice", "bob").await.unwrap();
        assert!(svc.get_pending_requests("bob").await.unwrap().is_empty());

        // No-op when nothing is pending.
        svc.cancel_friend_request("alice", "bob").await.unwrap();
        svc.send_friend_request("bob", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_block_removes_both_directions() {
        let svc = service().await;
        befriend(&svc, "alice", "bob").await;
        assert!(svc.is_connected("alice", "bob").await.unwrap());

        svc.block_user("alice", "bob").await.unwrap();
        assert!(!svc.is_connected("alice", "bob").await.unwrap());
        assert!(!svc.is_connected("bob", "alice").await.unwrap());
        assert!(svc.is_blocked("alice", "bob").await.unwrap());
        assert!(!svc.is_blocked("bob", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_rules() {
        let svc = service().await;
        let err = svc.block_user("alice", "alice").await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: You cannot block yourself.");

        svc.block_user("alice", "bob").await.unwrap();
        let err = svc.block_user("alice", "bob").await.unwrap_err();
        assert_eq!(err.to_string(), "Conflict: User already blocked.");

        svc.unblock_user("alice", "bob").await.unwrap();
        assert!(!svc.is_blocked("alice", "bob").await.unwrap());
        svc.unblock_user("alice", "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_connection_and_unfriend() {
        let svc = service().await;
        befriend(&svc, "alice", "bob").await;

        svc.remove_connection("alice", "bob").await.unwrap();
        assert!(!svc.is_connected("alice", "bob").await.unwrap());
        assert!(svc.is_connected("bob", "alice").await.unwrap());

        befriend(&svc, "carol", "dave").await;
        svc.unfriend("dave", "carol").await.unwrap();
        assert!(svc.friend_ids("carol").await.unwrap().is_empty());
        assert!(svc.friend_ids("dave").await.unwrap().is_empty());
    }
}
