pub mod auth;
pub mod commands;
pub mod error;
pub mod id;
pub mod logging;
pub mod model;
pub mod store;
pub mod sync;
pub mod time;

pub use error::{AppError, AppResult};
pub use logging::init_logging;
