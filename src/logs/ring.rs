//! Fixed-capacity ring of recent entries; the oldest entry is evicted when full.

use ringbuf::{traits::*, HeapRb};

use super::entry::LogEntry;

pub(crate) struct LogRing {
    buffer: HeapRb<LogEntry>,
}

impl LogRing {
    /// `capacity` must be non-zero (checked by config validation).
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Appends `entry`, returning `true` if the oldest entry was evicted.
    pub(crate) fn push(&mut self, entry: LogEntry) -> bool {
        match self.buffer.try_push(entry) {
            Ok(()) => false,
            Err(entry) => {
                let _ = self.buffer.try_pop();
                let _ = self.buffer.try_push(entry);
                true
            }
        }
    }

    /// Up to `n` most recent entries, oldest first.
    pub(crate) fn recent(&self, n: usize) -> Vec<LogEntry> {
        let len = self.buffer.occupied_len();
        self.buffer.iter().skip(len.saturating_sub(n)).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{Level, RawDiagnostic};
    use uuid::Uuid;

    fn entry(i: usize) -> LogEntry {
        LogEntry::accept(RawDiagnostic::new(Level::Info, "svc", format!("m{i}")), Uuid::nil())
    }

    #[test]
    fn evicts_oldest_and_never_exceeds_capacity() {
        let mut ring = LogRing::new(3);
        let evicted: Vec<bool> = (0..5).map(|i| ring.push(entry(i))).collect();
        assert_eq!(evicted, [false, false, false, true, true]);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.capacity(), 3);

        let msgs: Vec<_> = ring.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, ["m2", "m3", "m4"]);
        let msgs: Vec<_> = ring.recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, ["m3", "m4"]);
    }
}
