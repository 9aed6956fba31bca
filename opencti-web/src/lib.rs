pub mod handlers;
pub mod server;

pub use server::{WebState, build_router, serve};
