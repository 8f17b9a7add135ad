pub mod config;
pub mod error;
pub mod handler;
pub mod llm;
pub mod relay;

pub use handler::build_router;
