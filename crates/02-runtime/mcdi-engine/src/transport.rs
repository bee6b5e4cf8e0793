use std::sync::Arc;

/// Physical channel to the management controller.
///
/// Implementations own the shared-memory window or mailbox registers; the
/// engine only ever sees byte windows. All methods may be called while the
/// engine holds its response lock, so they must not call back into the
/// interface.
pub trait Transport: Send + Sync {
    /// Writes `header` followed by `payload` and rings the doorbell.
    fn send_request(&self, header: &[u8], payload: &[u8]);

    /// Copies `out.len()` bytes of the response buffer starting at `offset`.
    fn read_response(&self, offset: usize, out: &mut [u8]);

    /// True once the controller has written a response to the buffer.
    fn response_ready(&self) -> bool;

    /// Test-and-clear of the controller's reboot flag.
    fn poll_reboot(&self) -> bool;

    /// Tells the transport the current response has been fully read.
    ///
    /// Mailbox transports use this to stop reporting the same buffer as
    /// ready; shared-memory windows that are simply overwritten keep the
    /// default.
    fn consume_response(&self) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_request(&self, header: &[u8], payload: &[u8]) {
        (**self).send_request(header, payload)
    }

    fn read_response(&self, offset: usize, out: &mut [u8]) {
        (**self).read_response(offset, out)
    }

    fn response_ready(&self) -> bool {
        (**self).response_ready()
    }

    fn poll_reboot(&self) -> bool {
        (**self).poll_reboot()
    }

    fn consume_response(&self) {
        (**self).consume_response()
    }
}
