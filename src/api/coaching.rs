// AI coaching routes. These never fail on provider trouble; the services
// answer with fallback content instead.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::ai::{
    AiFeedback, GeneratedQuestion, PracticeContext, QaPair, SessionContext, SessionFeedback,
    SessionFeedbackContext, SessionResponse,
};
use crate::app_state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/coaching/questions", post(generate_questions))
        .route("/coaching/next-question", post(generate_next_question))
        .route("/coaching/feedback", post(analyze_response))
        .route("/coaching/session-feedback", post(analyze_full_session))
}

fn default_question_count() -> usize {
    5
}

#[derive(Deserialize)]
pub struct QuestionsBody {
    pub context: SessionContext,
    #[serde(default = "default_question_count")]
    pub count: usize,
}

#[derive(Deserialize)]
pub struct NextQuestionBody {
    pub context: SessionContext,
    #[serde(default)]
    pub history: Vec<QaPair>,
}

#[derive(Deserialize)]
pub struct FeedbackBody {
    pub response: String,
    pub context: PracticeContext,
}

#[derive(Deserialize)]
pub struct SessionFeedbackBody {
    pub responses: Vec<SessionResponse>,
    pub context: SessionFeedbackContext,
}

pub async fn generate_questions(
    State(state): State<AppState>,
    Json(body): Json<QuestionsBody>,
) -> Json<Vec<GeneratedQuestion>> {
    Json(state.questions.generate_questions(&body.context, body.count).await)
}

pub async fn generate_next_question(
    State(state): State<AppState>,
    Json(body): Json<NextQuestionBody>,
) -> Json<GeneratedQuestion> {
    Json(
        state
            .questions
            .generate_next_question(&body.context, &body.history)
            .await,
    )
}

pub async fn analyze_response(
    State(state): State<AppState>,
    Json(body): Json<FeedbackBody>,
) -> Json<AiFeedback> {
    Json(state.feedback.analyze_response(&body.response, &body.context).await)
}

pub async fn analyze_full_session(
    State(state): State<AppState>,
    Json(body): Json<SessionFeedbackBody>,
) -> Json<SessionFeedback> {
    Json(
        state
            .feedback
            .analyze_full_session(&body.responses, &body.context)
            .await,
    )
}
