use std::sync::{Mutex, PoisonError};

use scipline_frame::Response;
use tracing::trace;

/// Callback for unsolicited streaming data.
///
/// Runs on the reader thread: it must return quickly, and must not wait on
/// a transaction (only the reader thread can complete one) or replace the
/// handler from inside itself.
pub type StreamHandler = Box<dyn FnMut(Response) + Send>;

/// Holds the single registered stream handler.
#[derive(Default)]
pub struct StreamRouter {
    handler: Mutex<Option<StreamHandler>>,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler, replacing any previous one.
    pub fn set(&self, handler: StreamHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Remove the handler. Streaming data is dropped until a new one is set.
    pub fn clear(&self) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Pass a streaming response to the handler, synchronously.
    ///
    /// Returns false if no handler was installed; the response is dropped.
    pub fn route(&self, response: Response) -> bool {
        let mut guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(handler) => {
                handler(response);
                true
            }
            None => {
                trace!(command = ?response.command(), "no stream handler, dropping data");
                false
            }
        }
    }
}
