//! Request dispatch
//!
//! Maps an inbound request to a canned response through a table of exact
//! path rules. Unmatched paths get `404 Not Found` with an empty body.

pub mod response;
pub mod routes;


pub use response::CannedResponse;
pub use routes::{RouteRule, RouteTable};
