use crate::operation::Operation;
use crate::window::Timestamp;

/// Puts a plan's operations in process order.
///
/// Sorting is stable, so operations sharing a sequence number keep the order
/// they were supplied in.
#[derive(Debug, Clone)]
pub struct OperationSequencer {
    ordered: Vec<(usize, Operation)>,
}

impl OperationSequencer {
    pub fn new(operations: Vec<Operation>) -> Self {
        let mut ordered: Vec<(usize, Operation)> = operations.into_iter().enumerate().collect();
        ordered.sort_by_key(|(_, op)| op.sequence);
        Self { ordered }
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Operations in process order, each with its index in the original input.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Operation)> {
        self.ordered.iter().map(|(idx, op)| (*idx, op))
    }

    pub fn into_ordered(self) -> Vec<Operation> {
        self.ordered.into_iter().map(|(_, op)| op).collect()
    }
}

/// Carries the previous operation's end forward through the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainCursor {
    prev_end: Option<Timestamp>,
}

impl ChainCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prev_end(&self) -> Option<Timestamp> {
        self.prev_end
    }

    /// Starting candidate for the next operation: the declared start if any,
    /// else the previous end, else `fallback`. Never earlier than the
    /// previous end.
    pub fn seed(&self, declared: Option<Timestamp>, fallback: Timestamp) -> Timestamp {
        let candidate = declared.or(self.prev_end).unwrap_or(fallback);
        match self.prev_end {
            Some(prev_end) if candidate < prev_end => prev_end,
            _ => candidate,
        }
    }

    pub fn advance(&mut self, end: Timestamp) {
        self.prev_end = Some(end);
    }
}
