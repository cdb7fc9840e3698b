//! Service layer for the scheduler.
//!
//! # Components
//!
//! - `conflict` - Double-booking detection
//! - `slots` - Free slot suggestions
//! - `lifecycle` - Request/accept/reject/cancel/complete orchestration
//! - `directory` - Conference and profile lookup seam
//! - `quota` - Meeting quota seam
//! - `notifications` - Participant notification seam
//! - `chat` - Chat session provisioning client

pub mod chat;
pub mod conflict;
pub mod directory;
pub mod lifecycle;
pub mod notifications;
pub mod quota;
pub mod slots;

pub use chat::{ChatProvisioner, ChatSession, HttpChatProvisioner, ProvisionError};
pub use conflict::{ConflictDetector, ConflictPolicy, ConflictQuery};
pub use directory::{DirectoryError, ParticipantDirectory};
pub use lifecycle::{LifecyclePolicy, MeetingRequest, MeetingService};
pub use notifications::{LoggingNotificationChannel, Notification, NotificationChannel, NotifyError};
pub use quota::{QuotaChecker, QuotaDecision};
pub use slots::{FreeSlots, SlotPolicy};
