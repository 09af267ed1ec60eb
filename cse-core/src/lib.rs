//! The core CSE engine: the Dispatcher and the managers it orchestrates
//! (Registration, Subscription & Notification, Announcement), plus the
//! collaborators they share (per-resource locking, notification/announcement
//! transport).
//!
//! [`Cse`] is the facade a binary (or integration test) actually builds:
//! it wires `Storage`, the access evaluator, the event bus, the managers,
//! and the background expiration sweep together, and owns the root
//! `CSEBase` resource.

pub mod announcement;
pub mod cse;
pub mod dispatcher;
pub mod lock;
pub mod registration;
pub mod subscription;
pub mod transport;

pub use announcement::AnnouncementManager;
pub use cse::Cse;
pub use dispatcher::Dispatcher;
pub use lock::LockTable;
pub use registration::{is_originator_allowed, AdmissionOutcome, RegistrationManager};
pub use subscription::SubscriptionManager;
pub use transport::{
    AcmeNotificationTransport, HttpNotificationTransport, InMemoryRemoteCse, NotificationEnvelope,
    NotificationEvent, NotificationTransport, RemoteCseClient, TransportError,
};
