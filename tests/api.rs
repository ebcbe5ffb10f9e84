use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use aurify::{
    ai::GenerativeModel,
    api::create_router,
    app_state::AppState,
    config::Config,
    infrastructure::SqliteDatabase,
    notifications::{Message, MessagingProvider, TaskQueue, TaskRequest},
    AppError, AppResult,
};

#[derive(Default)]
struct RecordingMessaging {
    sent: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessagingProvider for RecordingMessaging {
    async fn send(&self, message: Message) -> AppResult<String> {
        self.sent.lock().await.push(message);
        Ok("projects/demo/messages/1".into())
    }
}

#[derive(Default)]
struct RecordingQueue {
    tasks: Mutex<Vec<TaskRequest>>,
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, request: TaskRequest) -> AppResult<String> {
        self.tasks.lock().await.push(request);
        Ok("tasks/1".into())
    }
}

struct UnavailableModel;

#[async_trait]
impl GenerativeModel for UnavailableModel {
    async fn generate_content(&self, _model_id: &str, _prompt: &str) -> AppResult<String> {
        Err(AppError::Provider("503 Service Unavailable".into()))
    }
}

struct TestApp {
    router: Router,
    messaging: Arc<RecordingMessaging>,
    queue: Arc<RecordingQueue>,
}

impl TestApp {
    async fn new() -> Self {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let messaging = Arc::new(RecordingMessaging::default());
        let queue = Arc::new(RecordingQueue::default());
        let state = AppState::with_providers(
            Config::for_tests(),
            db,
            messaging.clone(),
            queue.clone(),
            Arc::new(UnavailableModel),
        );
        Self {
            router: create_router(state),
            messaging,
            queue,
        }
    }

    async fn call(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.call(method, uri, user, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn text(&self, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let (status, bytes) = self.call(Method::POST, uri, None, body).await;
        (status, String::from_utf8(bytes).unwrap())
    }

    async fn create_profile_with_token(&self, uid: &str, token: &str) {
        let uri = format!("/api/v1/profiles/{}", uid);
        let (status, _) = self.json(Method::POST, &uri, Some(uid), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/profiles/{}/push-token", uid);
        let (status, _) = self.json(Method::PUT, &uri, Some(uid), Some(json!({"token": token}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_feedback_notification_endpoint() {
    let app = TestApp::new().await;

    let (status, text) = app
        .text(
            "/sendFeedbackNotification",
            Some(json!({
                "tokens": ["t1", "t2"],
                "payloads": [
                    {"notification": {"title": "Feedback ready", "body": "Open the app"}},
                    {"notification": {"title": "Feedback ready"}, "data": {"sessionId": "s1"}}
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Notification Request Processed");

    let sent = app.messaging.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].token, "t2");
    assert_eq!(sent[1].payload.data["sessionId"], "s1");
}

#[tokio::test]
async fn test_feedback_notification_rejects_mismatched_lengths() {
    let app = TestApp::new().await;
    let (status, text) = app
        .text(
            "/sendFeedbackNotification",
            Some(json!({"tokens": ["t1", "t2"], "payloads": [{}]})),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "Failed to process notification request");
    assert!(app.messaging.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_session_reminder_endpoint() {
    let app = TestApp::new().await;
    let (status, _) = app.text("/sendSessionReminder", Some(json!({"tokens": ["t1"]}))).await;
    assert_eq!(status, StatusCode::OK);

    let sent = app.messaging.sent.lock().await;
    let notification = sent[0].payload.notification.as_ref().unwrap();
    assert_eq!(notification.title, "Meeting starts in 10 minutes");

    drop(sent);
    let (status, _) = app.text("/sendSessionReminder", Some(json!({"wrong": true}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_daily_reminder_reaches_registered_devices() {
    let app = TestApp::new().await;
    let (status, _) = app.text("/dailyReminder", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.messaging.sent.lock().await.is_empty());

    app.create_profile_with_token("alice", "alice-token").await;
    app.create_profile_with_token("bob", "bob-token").await;

    let (status, _) = app.text("/dailyReminder", None).await;
    assert_eq!(status, StatusCode::OK);
    let tokens: Vec<String> = app.messaging.sent.lock().await.iter().map(|m| m.token.clone()).collect();
    assert_eq!(tokens, vec!["alice-token".to_string(), "bob-token".to_string()]);
}

#[tokio::test]
async fn test_missing_profile_reads_as_default_profile() {
    let app = TestApp::new().await;
    let (status, body) = app.json(Method::GET, "/api/v1/profiles/nobody", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "John Doe");
    assert_eq!(body["voice"], "animal");
}

#[tokio::test]
async fn test_profile_writes_require_owner() {
    let app = TestApp::new().await;
    let (status, body) = app
        .json(Method::POST, "/api/v1/profiles/alice", Some("bob"), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (status, _) = app
        .json(Method::POST, "/api/v1/profiles/alice", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_friend_request_flow() {
    let app = TestApp::new().await;

    let (status, request) = app
        .json(Method::POST, "/api/v1/friend-requests", Some("alice"), Some(json!({"toUserId": "bob"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");

    let (status, body) = app
        .json(Method::POST, "/api/v1/friend-requests", Some("alice"), Some(json!({"toUserId": "bob"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Friend request already pending.");

    let (_, incoming) = app.json(Method::GET, "/api/v1/friend-requests/incoming", Some("bob"), None).await;
    assert_eq!(incoming.as_array().unwrap().len(), 1);
    assert_eq!(incoming[0]["fromUserId"], "alice");

    let id = request["id"].as_str().unwrap();
    let uri = format!("/api/v1/friend-requests/{}/accept", id);
    let (status, body) = app.json(Method::POST, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only the recipient can answer a friend request.");
    let reject_uri = format!("/api/v1/friend-requests/{}/reject", id);
    let (status, _) = app.json(Method::POST, &reject_uri, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.json(Method::POST, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.json(Method::POST, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Friend request is not pending.");

    let (_, connections) = app.json(Method::GET, "/api/v1/users/alice/connections", None, None).await;
    assert_eq!(connections.as_array().unwrap().len(), 1);
    assert_eq!(connections[0]["friendId"], "bob");

    let (_, relationship) = app.json(Method::GET, "/api/v1/users/bob/relationship", Some("alice"), None).await;
    assert_eq!(relationship, json!({"connected": true, "blocked": false}));

    let (status, _) = app
        .json(Method::POST, "/api/v1/blocks", Some("alice"), Some(json!({"userId": "bob"})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, relationship) = app.json(Method::GET, "/api/v1/users/alice/relationship", Some("bob"), None).await;
    assert_eq!(relationship["connected"], false);
}

#[tokio::test]
async fn test_self_friend_request_is_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app
        .json(Method::POST, "/api/v1/friend-requests", Some("alice"), Some(json!({"toUserId": "alice"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Users cannot send requests to themselves.");
}

#[tokio::test]
async fn test_rating_flow() {
    let app = TestApp::new().await;

    let (status, _) = app
        .json(Method::POST, "/api/v1/users/bob/ratings", Some("alice"), Some(json!({"sessionId": "s1", "score": 6})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = app
        .json(Method::POST, "/api/v1/users/bob/ratings", Some("alice"), Some(json!({"sessionId": "s1", "score": 3})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary, json!({"average": 3.0, "count": 1}));

    app.json(Method::POST, "/api/v1/users/bob/ratings", Some("alice"), Some(json!({"sessionId": "s1", "score": 5})))
        .await;
    let (_, reputation) = app.json(Method::GET, "/api/v1/users/bob/reputation", None, None).await;
    assert_eq!(reputation, json!({"average": 5.0, "count": 1}));
}

#[tokio::test]
async fn test_booking_flow_notifies_owner() {
    let app = TestApp::new().await;
    app.create_profile_with_token("owner", "owner-token").await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/bookings",
            None,
            Some(json!({"startTime": "2025-10-14T09:00:00Z", "endTime": "2025-10-14T10:00:00Z", "service": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, session) = app
        .json(
            Method::POST,
            "/api/v1/bookings",
            Some("owner"),
            Some(json!({"startTime": "2025-10-14T09:00:00Z", "endTime": "2025-10-14T10:00:00Z", "service": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["status"], "Open");
    let session_id = session["sessionId"].as_str().unwrap().to_string();

    {
        let tasks = app.queue.tasks.lock().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].function_name, "sendSessionReminder");
        assert_eq!(tasks[0].schedule_time.to_rfc3339(), "2025-10-14T08:50:00+00:00");
    }

    let uri = format!("/api/v1/bookings/{}/requests", session_id);
    let (status, joined) = app.json(Method::POST, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["requests"], json!(["bob"]));

    {
        let sent = app.messaging.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "owner-token");
        assert_eq!(sent[0].payload.data["newUserIds"], r#"["bob"]"#);
    }

    let uri = format!("/api/v1/bookings/{}/requests/bob/accept", session_id);
    let (status, _) = app.json(Method::POST, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app.json(Method::POST, &uri, Some("owner"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["requests"], json!([]));
    assert_eq!(accepted["userIds"], json!(["bob"]));
    assert_eq!(accepted["participantIds"], json!([]));

    let (_, found) = app
        .json(Method::GET, "/api/v1/bookings/search?time=2025-10-14T09:30:00Z&service=0", None, None)
        .await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (_, none) = app
        .json(Method::GET, "/api/v1/bookings/search?time=2025-10-14T09:30:00Z&service=1", None, None)
        .await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_coaching_falls_back_when_provider_is_down() {
    let app = TestApp::new().await;

    let (status, questions) = app
        .json(
            Method::POST,
            "/api/v1/coaching/questions",
            None,
            Some(json!({"context": {"scenario": "Interviews"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(questions.as_array().unwrap().len(), 5);
    assert_eq!(questions[0]["question"], "Tell me about yourself and your background.");

    let (status, feedback) = app
        .json(
            Method::POST,
            "/api/v1/coaching/feedback",
            None,
            Some(json!({
                "response": "First I measured, then I fixed it!",
                "context": {"scenario": "Interviews", "question": "Tell me about a fix."}
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["clarity"], 85);
    assert!(feedback["detailedAnalysis"]["structure"].is_string());
}

#[tokio::test]
async fn test_feed_and_leaderboard() {
    let app = TestApp::new().await;
    let (status, _) = app
        .json(Method::POST, "/api/v1/posts", Some("alice"), Some(json!({"message": "Nailed my pitch!", "streak": 3})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .json(Method::POST, "/api/v1/posts", Some("alice"), Some(json!({"message": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, feed) = app.json(Method::GET, "/api/v1/feed", None, None).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
    assert_eq!(feed[0]["message"], "Nailed my pitch!");

    let (status, _) = app.json(Method::GET, "/api/v1/leaderboard?scope=friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
