pub mod routes;

pub use routes::{assemble, build_state, create_router, AppState, HealthResponse};
