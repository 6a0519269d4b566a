//! Common traits and helpers used across the mocksrv library

pub mod test_utils;
pub mod traits;

pub use test_utils::start_server_with_routes;
pub use traits::Dispatcher;
