/// DrainReport - Result of delivering the change outbox to its consumers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events delivered to every consumer and acknowledged
    pub delivered: usize,
    /// Delivery batches
    pub batches: usize,
}
