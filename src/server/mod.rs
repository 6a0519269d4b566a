//! Mock server lifecycle and connection handling

mod connection;
pub mod mock_server;


pub use mock_server::MockServer;
