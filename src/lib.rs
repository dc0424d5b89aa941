// Library exports for Odinbook
// This allows integration tests and external code to use Odinbook modules

pub mod auth;
pub mod avatars;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod social;
pub mod state;
pub mod storage;
