/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Hard cap on one outbound message, in bytes. Replies are chunked below it.
    pub max_message_len: usize,
}
