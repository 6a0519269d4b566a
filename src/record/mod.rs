//! Request capture
//!
//! Every request the server accepts is recorded here before its response is
//! written, so test code can assert on what was received.

pub mod journal;
pub mod request;

pub use journal::{RequestJournal, RequestRecorder};
pub use request::RecordedRequest;
