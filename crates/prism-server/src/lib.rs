//! prismd - HTTP surface for the Prism engine
//!
//! Exposes the streaming generation endpoint, the attachment cache and
//! status routes, and runs the periodic retention sweep.

pub mod error;
pub mod logging;
pub mod routes;
pub mod settings;
pub mod sink;
pub mod state;
pub mod sweeper;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
