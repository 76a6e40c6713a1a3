use crate::record::PendingRecord;
use std::collections::VecDeque;

/// Ordered, optionally bounded queue of records waiting to be flushed.
///
/// New records are inserted at the front, so the back always holds the
/// least-recently appended record. The limit is enforced when records are
/// inserted, never when the buffer is drained.
#[derive(Debug, Default)]
pub struct BufferStore {
    records: VecDeque<PendingRecord>,
    limit: Option<usize>,
}

impl BufferStore {
    pub fn new(limit: Option<usize>) -> Self {
        BufferStore {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Insert a record at the front.
    ///
    /// **Returns**
    /// - `Some(record)` with the evicted oldest record if the buffer was
    ///   already at capacity.
    /// - `None` otherwise.
    pub fn append(&mut self, record: PendingRecord) -> Option<PendingRecord> {
        let evicted = match self.limit {
            Some(0) => return Some(record),
            Some(limit) if self.records.len() >= limit => self.records.pop_back(),
            _ => None,
        };
        self.records.push_front(record);
        evicted
    }

    /// Take the whole content, newest first, leaving the buffer empty.
    pub fn drain_all(&mut self) -> Vec<PendingRecord> {
        std::mem::take(&mut self.records).into()
    }

    /// Put records that failed to send back at the front.
    ///
    /// Retried records win over records already waiting: on overflow the
    /// oldest waiting records are dropped silently. If the batch alone is
    /// larger than the limit only its first `limit` records are kept.
    ///
    /// **Returns** the number of records dropped to respect the limit.
    pub fn requeue(&mut self, records: Vec<PendingRecord>) -> usize {
        let mut dropped = 0;
        let mut records = records;

        if let Some(limit) = self.limit {
            if records.len() > limit {
                dropped += records.len() - limit;
                records.truncate(limit);
            }
            let room = limit - records.len();
            while self.records.len() > room {
                self.records.pop_back();
                dropped += 1;
            }
        }

        for record in records.into_iter().rev() {
            self.records.push_front(record);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
