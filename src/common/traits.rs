use crate::dispatch::CannedResponse;
use crate::record::RecordedRequest;

/// Chooses the response for a recorded request
///
/// The server calls this once per accepted request, after the request has
/// been queued in the journal. Implementations must always produce a
/// response; a miss is expressed as a response (usually `404`), never as an
/// absence.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: &RecordedRequest) -> CannedResponse;
}

/// Closures work as dispatchers
///
/// ```
/// use mocksrv::{CannedResponse, Dispatcher, RecordedRequest};
///
/// let echo_method = |request: &RecordedRequest| CannedResponse::ok(request.method.clone());
/// let request = RecordedRequest::new(0, "DELETE", "/items/7");
/// assert_eq!(&echo_method.dispatch(&request).body[..], b"DELETE");
/// ```
impl<F> Dispatcher for F
where
    F: Fn(&RecordedRequest) -> CannedResponse + Send + Sync,
{
    fn dispatch(&self, request: &RecordedRequest) -> CannedResponse {
        self(request)
    }
}
