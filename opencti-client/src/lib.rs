pub mod api;
pub mod client;
pub mod error;
pub mod graphql;

pub use api::{ListOptions, Observable, OpenCtiApi, OrderField};
pub use client::OpenCtiClient;
pub use error::ClientError;
