//! stageline-promote - promotion, rollback, and confirmation.
//!
//! # Architecture
//!
//! ```text
//! PromotionEngine
//!   ├── Pipeline            - which stage feeds which
//!   ├── WorkloadObserver    - current and candidate versions
//!   ├── VersionSetter       - pushes the new pin
//!   ├── HistoryLedger       - records promotions, answers rollback lookups
//!   ├── PromotionLocks      - one in-flight change per (namespace, label)
//!   └── ConfirmationWatcher - detached task per change
//!         └── Notifier      - success/failure messages to the operator
//! ```

pub mod engine;
pub mod error;
pub mod lock;
pub mod notify;
pub mod watcher;

pub use engine::{ChangeKind, PromotionEngine, PromotionOutcome, change_description};
pub use error::{PromoteError, PromoteResult};
pub use lock::{PromotionGuard, PromotionLocks};
pub use notify::{
    ChannelNotifier, Notification, Notifier, NotifyContext, Severity, TracingNotifier,
    WebhookNotifier,
};
pub use watcher::{
    Confirmation, ConfirmationRequest, ConfirmationWatcher, WatchAction, WatchOutcome, WatchState,
};
