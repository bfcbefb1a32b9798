//! Rolling event log mirroring the 3-record cyclic event file.
//!
//! ## Invariants
//!
//! - At most [`EVENT_LOG_CAPACITY`] entries
//! - Entries sorted by descending transaction number
//! - Slot ids are exactly `1..=len()` in that order after every mutation
//!
//! The API is deliberately narrow: entries only enter through
//! [`EventLog::append`], so the ordering cannot be bypassed.
//!
//! ```
//! use cdmx_card::card::EventLog;
//! use cdmx_card::records::Event;
//!
//! let mut log = EventLog::new();
//! for n in 1..=4 {
//!     let mut e = Event::default();
//!     e.transaction_number = n;
//!     log.append(e);
//! }
//! assert_eq!(log.len(), 3);
//! assert_eq!(log.last().map(|e| e.transaction_number), Some(4));
//! assert_eq!(log.next_transaction_number(), 5);
//! ```

use std::slice;

use crate::error::ParseError;
use crate::records::{is_blank, Event, Record, MAX_TRANSACTION_NUMBER};

/// Records in the event file.
pub const EVENT_LOG_CAPACITY: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventLog {
    entries: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Decode raw event records in slot order, skipping blank slots.
    pub fn from_records(records: &[Vec<u8>]) -> Result<Self, ParseError> {
        let mut log = Self::new();
        for (index, bytes) in records.iter().take(EVENT_LOG_CAPACITY).enumerate() {
            if is_blank(bytes) {
                continue;
            }
            log.append(Event::unpack(index as u8 + 1, bytes)?);
        }
        Ok(log)
    }

    /// Insert `event`, evicting the oldest entry when full.
    pub fn append(&mut self, event: Event) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.transaction_number)
                .map(|(i, _)| i)
            {
                self.entries.remove(oldest);
            }
        }
        self.entries.push(event);
        self.entries
            .sort_by(|a, b| b.transaction_number.cmp(&a.transaction_number));
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.slot = index as u8 + 1;
        }
    }

    /// Entry with the highest transaction number.
    pub fn last(&self) -> Option<&Event> {
        self.entries.iter().max_by_key(|e| e.transaction_number)
    }

    /// Transaction number for the next event (1 on a blank card).
    ///
    /// Past [`MAX_TRANSACTION_NUMBER`] the result no longer fits the event
    /// record; check [`EventLog::numbers_left`] first.
    pub fn next_transaction_number(&self) -> u32 {
        self.last().map_or(1, |e| e.transaction_number + 1)
    }

    /// Events the 24-bit counter can still number. The counter never wraps.
    pub fn numbers_left(&self) -> u32 {
        let last = self.last().map_or(0, |e| e.transaction_number);
        MAX_TRANSACTION_NUMBER.saturating_sub(last)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Event> {
        self.entries.iter()
    }

    /// Entries by ascending slot id, concatenated.
    pub fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut ordered: Vec<&Event> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.slot);

        let mut out = Vec::new();
        for event in ordered {
            out.extend(event.pack()?);
        }
        Ok(out)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RECORD_SIZE;

    fn event(tnum: u32) -> Event {
        let mut e = Event::new(0);
        e.transaction_number = tnum;
        e.amount = tnum as i32 * 10;
        e
    }

    fn numbers(log: &EventLog) -> Vec<u32> {
        log.iter().map(|e| e.transaction_number).collect()
    }

    fn slots(log: &EventLog) -> Vec<u8> {
        log.iter().map(|e| e.slot).collect()
    }

    #[test]
    fn test_append_orders_descending() {
        let mut log = EventLog::new();
        log.append(event(5));
        log.append(event(7));
        log.append(event(6));

        assert_eq!(numbers(&log), vec![7, 6, 5]);
        assert_eq!(slots(&log), vec![1, 2, 3]);
    }

    #[test]
    fn test_fourth_append_evicts_smallest() {
        let mut log = EventLog::new();
        for n in [10, 11, 12] {
            log.append(event(n));
        }
        log.append(event(13));

        assert_eq!(log.len(), 3);
        assert_eq!(numbers(&log), vec![13, 12, 11]);
        assert_eq!(slots(&log), vec![1, 2, 3]);
    }

    #[test]
    fn test_eviction_ignores_insertion_order() {
        let mut log = EventLog::new();
        for n in [20, 3, 15] {
            log.append(event(n));
        }
        log.append(event(21));
        assert_eq!(numbers(&log), vec![21, 20, 15]);
    }

    #[test]
    fn test_last_and_next_number() {
        let mut log = EventLog::new();
        assert!(log.last().is_none());
        assert_eq!(log.next_transaction_number(), 1);

        log.append(event(41));
        log.append(event(40));
        assert_eq!(log.last().unwrap().transaction_number, 41);
        assert_eq!(log.next_transaction_number(), 42);
    }

    #[test]
    fn test_numbers_left_stops_at_counter_limit() {
        let mut log = EventLog::new();
        assert_eq!(log.numbers_left(), MAX_TRANSACTION_NUMBER);

        log.append(event(MAX_TRANSACTION_NUMBER - 1));
        assert_eq!(log.numbers_left(), 1);

        log.append(event(MAX_TRANSACTION_NUMBER));
        assert_eq!(log.numbers_left(), 0);
    }

    #[test]
    fn test_pack_by_slot() {
        let mut log = EventLog::new();
        log.append(event(1));
        log.append(event(2));

        let bytes = log.pack().unwrap();
        assert_eq!(bytes.len(), 2 * RECORD_SIZE);
        let first = Event::unpack(1, &bytes[..RECORD_SIZE]).unwrap();
        assert_eq!(first.transaction_number, 2);
    }

    #[test]
    fn test_from_records_skips_blank() {
        let mut log = EventLog::new();
        log.append(event(8));
        log.append(event(9));
        let packed = log.pack().unwrap();

        let records = vec![
            packed[..RECORD_SIZE].to_vec(),
            packed[RECORD_SIZE..].to_vec(),
            vec![0u8; RECORD_SIZE],
        ];
        let decoded = EventLog::from_records(&records).unwrap();
        assert_eq!(decoded, log);
    }
}
