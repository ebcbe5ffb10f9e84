// Aurify backend - social graph, bookings, notifications and AI coaching

// Configuration and shared error type
pub mod config;
pub mod error;

// Document store, viewer context and request middleware
pub mod infrastructure;

// Document models, one module per collection family
pub mod models;

// Domain services over the document store
pub mod services;

// Push delivery and delayed task scheduling
pub mod notifications;

// AI question generation and feedback
pub mod ai;

// HTTP surface
pub mod api;
pub mod app_state;

// Re-exports for convenience
pub use app_state::AppState;
pub use error::{AppError, AppResult};
