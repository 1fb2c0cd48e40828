//! Counting limiter for outstanding stage tasks
//!
//! Slots are tokens in a bounded channel: acquiring sends a token (blocking
//! when the channel is full) and dropping the [`Permit`] takes one back out.

use crossbeam_channel::{bounded, select, Receiver, Sender};

/// Caps how many tasks of one stage may be outstanding at once.
#[derive(Debug)]
pub struct TaskLimiter {
    slots: Sender<()>,
    freed: Receiver<()>,
    capacity: usize,
}

/// Proof of an acquired slot; the slot is released when this is dropped.
#[derive(Debug)]
pub struct Permit {
    freed: Receiver<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        // our own token is still in the channel, so this never comes up empty
        let _ = self.freed.try_recv();
    }
}

impl TaskLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (slots, freed) = bounded(capacity);
        Self {
            slots,
            freed,
            capacity,
        }
    }

    /// Block until a slot is free.
    pub fn acquire(&self) -> Permit {
        // cannot fail: `self.freed` keeps the channel connected
        let _ = self.slots.send(());
        self.permit()
    }

    /// Block until a slot is free, or give up once `abort` disconnects.
    ///
    /// `abort` is a channel nobody sends on; its senders are held by whoever
    /// would eventually release slots, so disconnection means no slot will
    /// ever be freed again.
    pub fn acquire_or_abort(&self, abort: &Receiver<()>) -> Option<Permit> {
        select! {
            send(self.slots, ()) -> _ => Some(self.permit()),
            recv(abort) -> _ => None,
        }
    }

    pub fn try_acquire(&self) -> Option<Permit> {
        self.slots.try_send(()).ok().map(|_| self.permit())
    }

    /// Slots currently held.
    pub fn outstanding(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn permit(&self) -> Permit {
        Permit {
            freed: self.freed.clone(),
        }
    }
}
