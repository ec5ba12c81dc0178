/// Consumer side of a push channel.
///
/// A channel hands every inbound text frame to exactly one handler. Implementations must not
/// block: frames are delivered from the connection task in arrival order.
pub trait PushHandler: Send + Sync {
    fn handle_push(&self, payload: &str);
}

impl<F> PushHandler for F
where F: Fn(&str) + Send + Sync
{
    fn handle_push(&self, payload: &str) { self(payload) }
}
