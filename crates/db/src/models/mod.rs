//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Query-parameter DTOs where the entity supports filtered listing

pub mod image;
pub mod status;
pub mod user;
