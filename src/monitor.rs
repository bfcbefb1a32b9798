//! Card presence monitoring.
//!
//! A polling thread samples a [`CardPresence`] source at a fixed interval
//! and turns changes into [`PresenceEvent`]s. Events go over a channel to
//! one dispatcher thread that calls the listener, so listeners see events
//! one at a time and in order, and a slow listener never delays polling.
//!
//! ```
//! use std::sync::mpsc;
//! use std::time::Duration;
//!
//! use cdmx_card::error::ProtocolError;
//! use cdmx_card::monitor::{CardMonitor, PresenceEvent};
//! use cdmx_card::session::CardSerial;
//!
//! let serial = CardSerial::from_u64(1);
//! let (tx, rx) = mpsc::channel();
//! let monitor = CardMonitor::start(
//!     move || -> Result<Option<CardSerial>, ProtocolError> { Ok(Some(serial)) },
//!     move |event: PresenceEvent| {
//!         let _ = tx.send(event);
//!     },
//!     Duration::from_millis(1),
//! )
//! .unwrap();
//!
//! let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
//! assert_eq!(event, PresenceEvent::Inserted(serial));
//! monitor.stop();
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::session::CardSerial;

/// Something that can tell which card, if any, is in the reader field.
pub trait CardPresence: Send + 'static {
    fn poll(&mut self) -> Result<Option<CardSerial>, ProtocolError>;
}

impl<F> CardPresence for F
where
    F: FnMut() -> Result<Option<CardSerial>, ProtocolError> + Send + 'static,
{
    fn poll(&mut self) -> Result<Option<CardSerial>, ProtocolError> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Inserted(CardSerial),
    Removed(CardSerial),
}

pub trait PresenceListener: Send + 'static {
    fn on_event(&mut self, event: PresenceEvent);
}

impl<F> PresenceListener for F
where
    F: FnMut(PresenceEvent) + Send + 'static,
{
    fn on_event(&mut self, event: PresenceEvent) {
        self(event)
    }
}

/// Events implied by a change from `previous` to `current`.
fn transitions(previous: Option<CardSerial>, current: Option<CardSerial>) -> Vec<PresenceEvent> {
    match (previous, current) {
        (None, Some(card)) => vec![PresenceEvent::Inserted(card)],
        (Some(card), None) => vec![PresenceEvent::Removed(card)],
        (Some(old), Some(new)) if old != new => {
            vec![PresenceEvent::Removed(old), PresenceEvent::Inserted(new)]
        }
        _ => Vec::new(),
    }
}

pub struct CardMonitor {
    shutdown: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl CardMonitor {
    /// Spawn the polling and dispatcher threads.
    pub fn start<P, L>(mut source: P, mut listener: L, interval: Duration) -> io::Result<Self>
    where
        P: CardPresence,
        L: PresenceListener,
    {
        let (tx, rx) = mpsc::channel::<PresenceEvent>();

        let dispatcher = thread::Builder::new()
            .name("card-monitor-dispatch".into())
            .spawn(move || {
                for event in rx {
                    listener.on_event(event);
                }
            })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let poller = thread::Builder::new()
            .name("card-monitor-poll".into())
            .spawn(move || poll_loop(&mut source, &tx, &stop, interval))?;

        Ok(Self {
            shutdown,
            poller: Some(poller),
            dispatcher: Some(dispatcher),
        })
    }

    /// Stop polling, deliver pending events and join both threads.
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.poller.take() {
            let _ = handle.join();
        }
        // The poller owned the only sender, so the dispatcher drains and exits.
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CardMonitor {
    fn drop(&mut self) {
        self.join();
    }
}

fn poll_loop<P: CardPresence>(
    source: &mut P,
    tx: &Sender<PresenceEvent>,
    shutdown: &AtomicBool,
    interval: Duration,
) {
    let mut current = None;
    while !shutdown.load(Ordering::Acquire) {
        match source.poll() {
            Ok(seen) => {
                for event in transitions(current, seen) {
                    debug!(?event, "card presence changed");
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                current = seen;
            }
            Err(err) => warn!(error = %err, "card presence poll failed"),
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial(n: u64) -> CardSerial {
        CardSerial::from_u64(n)
    }

    #[test]
    fn test_transitions() {
        assert!(transitions(None, None).is_empty());
        assert!(transitions(Some(serial(1)), Some(serial(1))).is_empty());
        assert_eq!(
            transitions(None, Some(serial(1))),
            vec![PresenceEvent::Inserted(serial(1))]
        );
        assert_eq!(
            transitions(Some(serial(1)), Some(serial(2))),
            vec![
                PresenceEvent::Removed(serial(1)),
                PresenceEvent::Inserted(serial(2))
            ]
        );
    }

    #[test]
    fn test_monitor_delivers_in_order() {
        let script = vec![
            Ok(None),
            Ok(Some(serial(1))),
            Err(ProtocolError::CardRemoved),
            Ok(Some(serial(1))),
            Ok(None),
            Ok(Some(serial(2))),
            Ok(Some(serial(3))),
        ];
        let last = Some(serial(3));
        let mut steps = script.into_iter();
        let source = move || -> Result<Option<CardSerial>, ProtocolError> {
            steps.next().unwrap_or(Ok(last))
        };

        let (tx, rx) = mpsc::channel();
        let monitor = CardMonitor::start(
            source,
            move |event: PresenceEvent| {
                let _ = tx.send(event);
            },
            Duration::from_millis(1),
        )
        .unwrap();

        let received: Vec<PresenceEvent> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        monitor.stop();

        assert_eq!(
            received,
            vec![
                PresenceEvent::Inserted(serial(1)),
                PresenceEvent::Removed(serial(1)),
                PresenceEvent::Inserted(serial(2)),
                PresenceEvent::Removed(serial(2)),
                PresenceEvent::Inserted(serial(3)),
            ]
        );
        assert!(rx.try_recv().is_err());
    }
}
