pub mod auth;
pub mod commands;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod stats;
pub mod store;
pub mod types;

pub use lifecycle::{Confirmation, LifecycleController};
pub use session::SessionContext;
pub use store::{Collection, MeetingStore};
