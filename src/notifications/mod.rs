// Notifications - push delivery, delayed task scheduling and the dispatcher
// that reacts to booking changes.

pub mod dispatcher;
pub mod messaging;
pub mod tasks;

pub use dispatcher::{DeliveryReport, NotificationDispatcher};
pub use messaging::{FcmClient, FcmPayload, Message, MessagingProvider, MulticastMessage, Notification};
pub use tasks::{CloudTasksClient, TaskQueue, TaskRequest};
