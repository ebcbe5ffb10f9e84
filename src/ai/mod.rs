// AI coaching - question generation and answer feedback over a model chain.

pub mod client;
pub mod feedback;
pub mod parsing;
pub mod questions;

pub use client::{GeminiClient, GenerativeModel, ModelChain, RetryPolicy};
pub use feedback::{AiFeedback, FeedbackService, PracticeContext, SessionFeedback, SessionFeedbackContext, SessionResponse};
pub use questions::{GeneratedQuestion, QaPair, QuestionGenerator, SessionContext};
