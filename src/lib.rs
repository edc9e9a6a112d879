// Library exports for PixelPals
// This allows integration tests and external code to use PixelPals modules

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod interaction;
pub mod likes;
pub mod posts;
pub mod routes;
pub mod state;
pub mod upload;

pub use routes::build_router;
pub use state::AppState;
