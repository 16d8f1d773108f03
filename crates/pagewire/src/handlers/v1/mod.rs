//! V1 API handlers.

mod navigation;
mod operations;
mod ping;
mod sessions;

pub use navigation::navigation;
pub use operations::operations;
pub use ping::ping;
pub use sessions::{delete_session, get_session, list_sessions};
