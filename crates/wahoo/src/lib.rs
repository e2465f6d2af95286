pub mod api;
pub mod banner;
pub mod browser;
pub mod config;
pub mod pairing;
