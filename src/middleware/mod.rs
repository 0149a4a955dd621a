mod auth;
mod core;
mod schema;

pub use auth::AuthMiddleware;
pub use core::Middleware;
pub use schema::SchemaParseMiddleware;
