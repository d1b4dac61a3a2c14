pub mod auth;
pub mod contents;
pub mod devices;
pub mod displays;
pub mod error;
pub mod middleware;
pub mod playlists;
pub mod router;
pub mod storage;
