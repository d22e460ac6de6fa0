//! Request handlers for the image pipeline API.
//!
//! Each submodule provides async handler functions for a single resource.
//! Handlers delegate to the repositories in `darkroom_db` and map errors
//! via [`AppError`](crate::error::AppError).

pub mod auth;
pub mod images;
pub mod stats;
pub mod system;
