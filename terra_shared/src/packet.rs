//! Reusable outbound packet buffer.
//!
//! A [`PacketBuffer`] is a single-writer-at-a-time resource scoped per
//! logical send, not per connection: `prepare` claims the buffer for the
//! calling thread, `take` releases it by handing the bytes to the network
//! layer. Each reliable session owns one buffer; the datagram multiplexer
//! shares one across all simulation sends.

use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;

use bytes::Bytes;

use crate::wire::{PacketId, MAX_PACKET_SIZE, PACKET_DATA_SEPARATOR, PACKET_TAG_SIZE};

bitflags::bitflags! {
    /// Packet buffer state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u32 {
        /// A write overran capacity; the buffer rejects all writes until the
        /// next successful `prepare`.
        const WRITE_ERROR = 1 << 0;
        /// The buffer content was handed to the network layer and the buffer
        /// may be re-prepared by any thread.
        const COMPLETE = 1 << 1;
    }
}

struct Inner {
    data: Vec<u8>,
    flags: PacketFlags,
    owner: Option<ThreadId>,
}

/// Fixed-capacity wire buffer with the prepare/complete write discipline.
pub struct PacketBuffer {
    inner: Mutex<Inner>,
    released: Condvar,
    capacity: usize,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PACKET_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: Vec::with_capacity(capacity),
                // A fresh buffer is immediately claimable.
                flags: PacketFlags::COMPLETE,
                owner: None,
            }),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Clears previous content and writes the packet id tag, claiming the
    /// buffer for the calling thread.
    ///
    /// Blocks while a *different* thread holds an in-flight write that has
    /// not been marked complete. A buffer that is empty, complete, or in
    /// write-error state is re-prepared immediately from any thread.
    pub fn prepare(&self, id: PacketId) {
        let this_thread = std::thread::current().id();
        let mut inner = self.inner.lock().unwrap();

        while !inner.flags.contains(PacketFlags::COMPLETE)
            && !inner.flags.contains(PacketFlags::WRITE_ERROR)
            && inner.data.len() > PACKET_TAG_SIZE
            && inner.owner.is_some_and(|owner| owner != this_thread)
        {
            inner = self.released.wait(inner).unwrap();
        }

        inner.flags = PacketFlags::empty();
        inner.owner = Some(this_thread);
        inner.data.clear();
        inner.data.extend_from_slice(&(id as i32).to_le_bytes());
    }

    /// Appends raw bytes. On overflow the write is rejected, WRITE_ERROR is
    /// latched, and every later write fails until the next `prepare`.
    pub fn write_bytes(&self, bytes: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.flags.contains(PacketFlags::WRITE_ERROR) {
            return false;
        }
        if inner.data.len() + bytes.len() > self.capacity {
            tracing::error!(
                len = inner.data.len(),
                extra = bytes.len(),
                capacity = self.capacity,
                "packet buffer overflow, write rejected"
            );
            inner.flags.insert(PacketFlags::WRITE_ERROR);
            return false;
        }
        inner.data.extend_from_slice(bytes);
        true
    }

    /// Appends fixed-width little-endian integers.
    pub fn write_i32(&self, values: &[i32]) -> bool {
        values.iter().all(|v| self.write_bytes(&v.to_le_bytes()))
    }

    /// Appends fixed-width little-endian floats.
    pub fn write_f32(&self, values: &[f32]) -> bool {
        values.iter().all(|v| self.write_bytes(&v.to_le_bytes()))
    }

    pub fn write_str(&self, s: &str) -> bool {
        self.write_bytes(s.as_bytes())
    }

    /// Appends the reserved record separator sentinel.
    pub fn write_separator(&self) -> bool {
        self.write_bytes(&[PACKET_DATA_SEPARATOR])
    }

    pub fn flags(&self) -> PacketFlags {
        self.inner.lock().unwrap().flags
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands the packet bytes to the network layer, marking the buffer
    /// complete and waking any thread blocked in `prepare`.
    ///
    /// Returns `None` if the buffer is in write-error state; the send is
    /// abandoned and the buffer stays claimable via `prepare`.
    pub fn take(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        if inner.flags.contains(PacketFlags::WRITE_ERROR) {
            self.released.notify_all();
            return None;
        }
        let bytes = Bytes::copy_from_slice(&inner.data);
        inner.flags.insert(PacketFlags::COMPLETE);
        drop(inner);
        self.released.notify_all();
        Some(bytes)
    }

    /// Marks the buffer complete without taking the content. Used when a
    /// send is dropped (e.g. no datagram endpoint is known yet).
    pub fn abandon(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.flags.insert(PacketFlags::COMPLETE);
        drop(inner);
        self.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn tag_is_written_first() {
        let buf = PacketBuffer::new();
        buf.prepare(PacketId::PlayerId);
        buf.write_i32(&[7]);
        let bytes = buf.take().unwrap();
        assert_eq!(&bytes[..4], &(PacketId::PlayerId as i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
    }

    #[test]
    fn overflow_latches_write_error() {
        let buf = PacketBuffer::with_capacity(8);
        buf.prepare(PacketId::ChatMessage);
        assert!(buf.write_i32(&[1]));
        // 4 tag + 4 payload = capacity; one more byte overflows.
        assert!(!buf.write_bytes(&[0xAA]));
        assert!(buf.flags().contains(PacketFlags::WRITE_ERROR));
        // Every later write fails too, even one that would fit.
        assert!(!buf.write_bytes(&[]));
        assert!(buf.take().is_none());

        // Re-prepare clears the error.
        buf.prepare(PacketId::ChatMessage);
        assert!(!buf.flags().contains(PacketFlags::WRITE_ERROR));
        assert!(buf.write_bytes(&[0xAA]));
    }

    #[test]
    fn same_thread_may_reprepare() {
        let buf = PacketBuffer::new();
        buf.prepare(PacketId::ChatMessage);
        buf.write_str("abandoned mid-write");
        // Same thread starts over without ever completing the first packet.
        buf.prepare(PacketId::ServerMessage);
        let bytes = buf.take().unwrap();
        assert_eq!(&bytes[..4], &(PacketId::ServerMessage as i32).to_le_bytes());
    }

    #[test]
    fn prepare_blocks_until_other_thread_completes() {
        let buf = Arc::new(PacketBuffer::new());
        buf.prepare(PacketId::ChatMessage);
        buf.write_str("in flight");

        let other_entered = Arc::new(AtomicBool::new(false));
        let other_done = Arc::new(AtomicBool::new(false));
        let handle = {
            let buf = Arc::clone(&buf);
            let entered = Arc::clone(&other_entered);
            let done = Arc::clone(&other_done);
            std::thread::spawn(move || {
                entered.store(true, Ordering::SeqCst);
                buf.prepare(PacketId::ServerMessage);
                done.store(true, Ordering::SeqCst);
            })
        };

        while !other_entered.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(50));
        assert!(
            !other_done.load(Ordering::SeqCst),
            "second thread must block while the first packet is in flight"
        );

        // Queuing to the network layer releases the buffer.
        let _ = buf.take().unwrap();
        handle.join().unwrap();
        assert!(other_done.load(Ordering::SeqCst));
    }

    #[test]
    fn write_error_state_allows_foreign_prepare() {
        let buf = Arc::new(PacketBuffer::with_capacity(8));
        buf.prepare(PacketId::ChatMessage);
        buf.write_bytes(&[0u8; 32]); // overflow, latches WRITE_ERROR

        let buf2 = Arc::clone(&buf);
        // Must not block even though another thread owns the buffer.
        std::thread::spawn(move || buf2.prepare(PacketId::ServerMessage))
            .join()
            .unwrap();
    }
}
