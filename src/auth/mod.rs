pub mod handlers;
pub mod linking;
pub mod session;
