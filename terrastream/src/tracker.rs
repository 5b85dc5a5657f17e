//! Recency tracker that decides which tiles to evict.
//!
//! The tracker keeps every live item in a doubly-linked list ordered by the
//! last time it was touched, most recent first. A *sentry* entry marks the
//! boundary of the current pass:
//!
//! ```text
//!   head ─► [touched this pass ...] ─► SENTRY ─► [not touched since last flush ...] ─► tail
//! ```
//!
//! [`Tracker::touch`] moves an entry to the head in O(1). [`Tracker::flush`]
//! walks from the tail up to the sentry, offering each stale entry to a
//! dispose callback, then moves the sentry back to the head so that the next
//! pass starts empty.
//!
//! Entries live in a [`slab::Slab`]; a [`TrackerToken`] is the slab index plus
//! a generation stamp so that a token kept past its entry's removal is
//! recognized as stale instead of aliasing a newer entry.

use slab::Slab;

const NIL: usize = usize::MAX;

/// Handle to a tracked entry, returned by [`Tracker::touch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerToken {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Entry<T> {
    /// `None` only for the sentry.
    item: Option<T>,
    generation: u64,
    prev: usize,
    next: usize,
}

/// LRU list with a per-pass sentry.
#[derive(Debug)]
pub struct Tracker<T> {
    entries: Slab<Entry<T>>,
    head: usize,
    tail: usize,
    sentry: usize,
    next_generation: u64,
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tracker<T> {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        let mut tracker = Self {
            entries: Slab::new(),
            head: NIL,
            tail: NIL,
            sentry: NIL,
            next_generation: 0,
        };
        tracker.insert_sentry();
        tracker
    }

    fn insert_sentry(&mut self) {
        let sentry = self.entries.insert(Entry {
            item: None,
            generation: 0,
            prev: NIL,
            next: NIL,
        });
        self.sentry = sentry;
        self.push_front(sentry);
    }

    /// Number of tracked items, excluding the sentry.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `token` still refers to a live entry.
    pub fn contains(&self, token: TrackerToken) -> bool {
        self.resolve(token).is_some()
    }

    fn resolve(&self, token: TrackerToken) -> Option<usize> {
        match self.entries.get(token.index) {
            Some(entry) if entry.item.is_some() && entry.generation == token.generation => {
                Some(token.index)
            }
            _ => None,
        }
    }

    /// Marks `item` as used in the current pass.
    ///
    /// With a live `token` the existing entry moves to the head and the same
    /// token is returned. Without one, or with a stale one, a new entry is
    /// inserted at the head and a fresh token is returned.
    pub fn touch(&mut self, item: T, token: Option<TrackerToken>) -> TrackerToken {
        if let Some(index) = token.and_then(|t| self.resolve(t)) {
            self.unlink(index);
            self.push_front(index);
            return TrackerToken {
                index,
                generation: self.entries[index].generation,
            };
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let index = self.entries.insert(Entry {
            item: Some(item),
            generation,
            prev: NIL,
            next: NIL,
        });
        self.push_front(index);
        TrackerToken { index, generation }
    }

    /// Offers every entry not touched since the previous flush to `dispose`,
    /// least recently used first.
    ///
    /// Entries for which `dispose` returns `true` are removed, up to
    /// `max_dispose` of them; the rest stay tracked and are offered again on
    /// the next flush. Returns the number of removed entries.
    pub fn flush<F>(&mut self, max_dispose: usize, mut dispose: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        let mut cursor = self.tail;

        while cursor != self.sentry && cursor != NIL && removed < max_dispose {
            let prev = self.entries[cursor].prev;
            let evict = match self.entries[cursor].item.as_ref() {
                Some(item) => dispose(item),
                None => false,
            };
            if evict {
                self.unlink(cursor);
                self.entries.remove(cursor);
                removed += 1;
            }
            cursor = prev;
        }

        let sentry = self.sentry;
        self.unlink(sentry);
        self.push_front(sentry);
        removed
    }

    /// Removes the entry behind `token`, returning its item.
    pub fn remove(&mut self, token: TrackerToken) -> Option<T> {
        let index = self.resolve(token)?;
        self.unlink(index);
        self.entries.remove(index).item
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = NIL;
        self.tail = NIL;
        self.insert_sentry();
    }

    /// Items from most to least recently touched.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || loop {
            if cursor == NIL {
                return None;
            }
            let entry = &self.entries[cursor];
            cursor = entry.next;
            if let Some(item) = entry.item.as_ref() {
                return Some(item);
            }
        })
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let entry = &self.entries[index];
            (entry.prev, entry.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }
        let entry = &mut self.entries[index];
        entry.prev = NIL;
        entry.next = NIL;
    }

    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let entry = &mut self.entries[index];
            entry.prev = NIL;
            entry.next = old_head;
        }
        if old_head == NIL {
            self.tail = index;
        } else {
            self.entries[old_head].prev = index;
        }
        self.head = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(tracker: &Tracker<&'static str>) -> Vec<&'static str> {
        tracker.iter().copied().collect()
    }

    #[test]
    fn test_touch_inserts_at_front() {
        let mut tracker = Tracker::new();
        tracker.touch("a", None);
        tracker.touch("b", None);
        tracker.touch("c", None);
        assert_eq!(tracker.len(), 3);
        assert_eq!(order(&tracker), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_touch_with_token_moves_to_front() {
        let mut tracker = Tracker::new();
        let a = tracker.touch("a", None);
        tracker.touch("b", None);
        let again = tracker.touch("a", Some(a));
        assert_eq!(again, a);
        assert_eq!(tracker.len(), 2);
        assert_eq!(order(&tracker), vec!["a", "b"]);
    }

    #[test]
    fn test_flush_offers_only_untouched_entries() {
        let mut tracker = Tracker::new();
        let a = tracker.touch("a", None);
        let b = tracker.touch("b", None);
        tracker.flush(usize::MAX, |_| false);

        // Next pass: only "a" is touched.
        tracker.touch("a", Some(a));
        let mut offered = Vec::new();
        let removed = tracker.flush(usize::MAX, |item| {
            offered.push(*item);
            true
        });

        assert_eq!(offered, vec!["b"]);
        assert_eq!(removed, 1);
        assert!(tracker.contains(a));
        assert!(!tracker.contains(b));
    }

    #[test]
    fn test_flush_visits_least_recent_first() {
        let mut tracker = Tracker::new();
        tracker.touch("a", None);
        tracker.touch("b", None);
        tracker.touch("c", None);

        // Everything was touched during the first pass.
        let mut offered = Vec::new();
        tracker.flush(usize::MAX, |item| {
            offered.push(*item);
            false
        });
        assert!(offered.is_empty());

        tracker.flush(usize::MAX, |item| {
            offered.push(*item);
            false
        });
        assert_eq!(offered, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_refused_entries_are_offered_again() {
        let mut tracker = Tracker::new();
        tracker.touch("pinned", None);
        tracker.flush(usize::MAX, |_| false);

        let mut offered = 0;
        tracker.flush(usize::MAX, |_| {
            offered += 1;
            false
        });
        assert_eq!(offered, 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_max_dispose_bounds_removals() {
        let mut tracker = Tracker::new();
        for name in ["a", "b", "c", "d"] {
            tracker.touch(name, None);
        }
        tracker.flush(usize::MAX, |_| true);
        let removed = tracker.flush(2, |_| true);
        assert_eq!(removed, 2);
        assert_eq!(order(&tracker), vec!["d", "c"]);
    }

    #[test]
    fn test_entries_touched_every_pass_survive() {
        let mut tracker = Tracker::new();
        let mut tokens: Vec<Option<TrackerToken>> = vec![None; 100];
        for _ in 0..5 {
            for (i, token) in tokens.iter_mut().enumerate() {
                *token = Some(tracker.touch(i, *token));
            }
            let removed = tracker.flush(usize::MAX, |_| true);
            assert_eq!(removed, 0);
        }
        assert_eq!(tracker.len(), 100);
    }

    #[test]
    fn test_stale_token_inserts_new_entry() {
        let mut tracker = Tracker::new();
        let a = tracker.touch("a", None);
        assert_eq!(tracker.remove(a), Some("a"));

        // The slab slot is reused, but the old token must not alias it.
        let b = tracker.touch("b", None);
        assert!(!tracker.contains(a));
        let c = tracker.touch("c", Some(a));
        assert_ne!(b, c);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut tracker = Tracker::new();
        let a = tracker.touch("a", None);
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(!tracker.contains(a));
        tracker.touch("b", None);
        assert_eq!(order(&tracker), vec!["b"]);
    }
}
