pub mod health;
pub mod ops;
pub mod routes;

pub use routes::{create_router, AppState};
