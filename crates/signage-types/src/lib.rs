//! Types shared between the signage server crates and their clients.

pub mod api;
pub mod events;
pub mod models;
