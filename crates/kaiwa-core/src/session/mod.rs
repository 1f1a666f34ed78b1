//! Session domain module.
//!
//! - `model`: session summary record (`Session`)
//! - `message`: conversation turns (`Message`)
//! - `repository`: the observable store contract (`ChatStore`)

mod message;
mod model;
mod repository;

pub use message::Message;
pub use model::{Session, sort_recent_first};
pub use repository::{ChatStore, MessagesWatcher, SessionsWatcher};
