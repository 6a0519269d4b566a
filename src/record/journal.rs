use super::request::RecordedRequest;
use crate::{MockError, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

/// Ordered FIFO of recorded requests with a bounded wait on take
///
/// The journal is the receiving half; [`RequestRecorder`] handles are the
/// sending half and live inside the server's connection tasks. Once every
/// recorder has been dropped, takes drain what is left and then fail with
/// [`MockError::Stopped`] instead of waiting.
///
/// # Examples
///
/// ```
/// use mocksrv::{RecordedRequest, RequestJournal};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let (journal, recorder) = RequestJournal::new();
/// recorder.record(RecordedRequest::new(0, "GET", "/a"));
/// recorder.record(RecordedRequest::new(0, "GET", "/b"));
///
/// let first = journal.take(Duration::from_millis(10)).await.unwrap();
/// assert_eq!((first.sequence, first.path.as_str()), (0, "/a"));
/// let second = journal.take(Duration::from_millis(10)).await.unwrap();
/// assert_eq!((second.sequence, second.path.as_str()), (1, "/b"));
/// # });
/// ```
#[derive(Debug)]
pub struct RequestJournal {
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<RecordedRequest>>,
    recorded: Arc<Mutex<u64>>,
}

/// Sending half of a [`RequestJournal`]
#[derive(Debug, Clone)]
pub struct RequestRecorder {
    sender: mpsc::UnboundedSender<RecordedRequest>,
    recorded: Arc<Mutex<u64>>,
}

impl RequestJournal {
    /// Creates an empty journal and the recorder that feeds it
    pub fn new() -> (Self, RequestRecorder) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let recorded = Arc::new(Mutex::new(0));
        let journal = Self {
            receiver: tokio::sync::Mutex::new(receiver),
            recorded: recorded.clone(),
        };
        (journal, RequestRecorder { sender, recorded })
    }

    /// Waits up to `wait` for the oldest uncollected request and removes it
    pub async fn take(&self, wait: Duration) -> Result<RecordedRequest> {
        let next = timeout(wait, async { self.receiver.lock().await.recv().await }).await;
        match next {
            Ok(Some(request)) => Ok(request),
            Ok(None) => Err(MockError::Stopped),
            Err(_) => Err(MockError::TakeTimeout(wait)),
        }
    }

    /// Removes the oldest uncollected request without waiting
    ///
    /// Returns `None` when nothing is queued or another caller is mid-take.
    pub fn try_take(&self) -> Option<RecordedRequest> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Total number of requests recorded, collected or not
    pub fn recorded_count(&self) -> u64 {
        *self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestRecorder {
    /// Assigns the next arrival index to `request` and queues it
    ///
    /// Index assignment and enqueue happen under one lock so that queue
    /// order always matches `sequence` order.
    pub fn record(&self, mut request: RecordedRequest) -> RecordedRequest {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        request.sequence = *recorded;
        *recorded += 1;

        if self.sender.send(request.clone()).is_err() {
            debug!(sequence = request.sequence, "Journal dropped, request not queued");
        }
        request
    }
}
