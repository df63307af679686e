pub mod merge;
mod session;

pub use session::{spawn_session, SessionHandle};
