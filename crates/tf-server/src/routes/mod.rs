//! Route handlers for the HTTP surface.

pub mod events;
pub mod health;
pub mod joins;
pub mod prepare;
pub mod status;
