use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::GameEvent;

/// An opaque iterator that drains pending [`GameEvent`]s.
///
/// Obtain one from [`GameSession::events()`] or [`RoundCoordinator::drain_events()`].
///
/// ```ignore
/// for event in session.events() {
///     if let GameEvent::RoundResolved { result, .. } = event {
///         println!("round {} done", result.round_index);
///     }
/// }
/// ```
///
/// [`GameSession::events()`]: crate::GameSession::events
/// [`RoundCoordinator::drain_events()`]: crate::RoundCoordinator::drain_events
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, GameEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, GameEvent>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = GameEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn drains_in_order_and_empties_the_queue() {
        let mut queue: VecDeque<GameEvent> =
            VecDeque::from([GameEvent::PeerConnected, GameEvent::GameReset]);
        {
            let mut drain = EventDrain::from_drain(queue.drain(..));
            assert_eq!(drain.len(), 2);
            assert_eq!(drain.next(), Some(GameEvent::PeerConnected));
            assert!(format!("{drain:?}").contains("remaining: 1"));
            assert_eq!(drain.next_back(), Some(GameEvent::GameReset));
            assert_eq!(drain.next(), None);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn dropping_a_partial_drain_discards_the_rest() {
        let mut queue: VecDeque<GameEvent> =
            VecDeque::from([GameEvent::PeerConnected, GameEvent::PeerDisconnected]);
        let first = EventDrain::from_drain(queue.drain(..)).next();
        assert_eq!(first, Some(GameEvent::PeerConnected));
        assert!(queue.is_empty());
    }
}
