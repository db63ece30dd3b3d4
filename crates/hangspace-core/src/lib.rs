//! Hangspace client core.
//!
//! Pure state machines for the real-time half of the Hangspace client. Each
//! component owns its state exclusively, takes time as an argument, and
//! returns what the caller should do next instead of doing I/O itself. This
//! keeps every ordering and timing rule testable with a virtual clock.
//!
//! # Components
//!
//! - [`Channel`]: event channel lifecycle, bounded reconnect with backoff,
//!   acknowledgements and subscriptions
//! - [`PresenceTracker`]: last-write-wins online/offline/away map
//! - [`Roster`]: identities of users the client knows about
//! - [`NotificationAggregator`]: per-sender unread bundles and the global
//!   unread counter
//! - [`TypingCoordinator`]: local typing start/stop debounce and remote typing
//!   sets
//! - [`MessageStream`]: optimistic sends reconciled against server echoes
//! - [`SearchSession`]: debounced, token-guarded user search
//! - [`Timer`]: cancellable scheduled task owned by the component that armed it

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod env;
pub mod error;
pub mod format;
pub mod messages;
pub mod notifications;
pub mod presence;
pub mod roster;
pub mod search;
pub mod timer;
pub mod typing;

pub use channel::{Channel, ChannelAction, ChannelConfig, ChannelState, DropReason};
pub use env::{Environment, MonotonicInstant};
pub use error::{ChannelError, RequestError, ValidationError};
pub use messages::{
    DeliveryState, EntryKind, Ingested, LocalId, MessageStream, RenderedEntry, StreamEntry,
};
pub use notifications::{
    BundleKey, NotificationAggregator, NotificationBundle, NotificationConfig, Push, PushOutcome,
    PushSender,
};
pub use presence::PresenceTracker;
pub use roster::{Roster, User};
pub use search::{SearchConfig, SearchRequest, SearchSession, SearchStatus};
pub use timer::Timer;
pub use typing::{TypingConfig, TypingCoordinator, TypingEmit, compose_names};
