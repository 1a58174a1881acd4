use crate::error::SyncError;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Buffer capacity used by [`BoundedBytePipe::new`]
///
/// [`BoundedBytePipe::new`]: struct.BoundedBytePipe.html#method.new
pub const DEFAULT_CAPACITY: usize = 1024;

// Blocked calls wake this often to re-check closure and peer
// liveness, so a lost notification can never strand a side forever.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// A circular buffer cannot tell full from empty by cursor equality
// alone, so the write cursor is `None` while the buffer is empty and
// `in_pos == out_pos` with `Some` means full.
struct PipeBuf {
    buf: Box<[u8]>,
    in_pos: Option<usize>,
    out_pos: usize,
    closed_by_writer: bool,
    closed_by_reader: bool,
    // Endpoint handle dropped mid-panic: the peer's thread is gone
    // without an orderly close
    writer_gone: bool,
    reader_gone: bool,
    writer_taken: bool,
    reader_taken: bool,
}

impl PipeBuf {
    fn is_full(&self) -> bool {
        self.in_pos == Some(self.out_pos)
    }

    fn available(&self) -> usize {
        match self.in_pos {
            None => 0,
            Some(p) if p > self.out_pos => p - self.out_pos,
            Some(p) => self.buf.len() - (self.out_pos - p),
        }
    }

    // Copy one contiguous run from `src` into the buffer, wrapping at
    // the capacity boundary on the next call.  Returns 0 when full.
    fn write_some(&mut self, src: &[u8]) -> usize {
        if self.is_full() {
            return 0;
        }
        let cap = self.buf.len();
        let start = self.in_pos.unwrap_or(self.out_pos);
        let contiguous = if self.in_pos.is_none() || start >= self.out_pos {
            cap - start
        } else {
            self.out_pos - start
        };
        let n = src.len().min(contiguous);
        self.buf[start..start + n].copy_from_slice(&src[..n]);
        self.in_pos = Some((start + n) % cap);
        n
    }

    // Copy out one contiguous run, up to the wrap boundary.  Returns 0
    // when empty.
    fn read_some(&mut self, dst: &mut [u8]) -> usize {
        let in_pos = match self.in_pos {
            Some(p) => p,
            None => return 0,
        };
        let cap = self.buf.len();
        let contiguous = if in_pos > self.out_pos {
            in_pos - self.out_pos
        } else {
            cap - self.out_pos
        };
        let n = dst.len().min(contiguous);
        dst[..n].copy_from_slice(&self.buf[self.out_pos..self.out_pos + n]);
        self.out_pos = (self.out_pos + n) % cap;
        if n > 0 && self.out_pos == in_pos {
            self.in_pos = None;
        }
        n
    }
}

struct PipeInner {
    lock: Mutex<PipeBuf>,
    cond: Condvar,
}

/// In-process single-writer/single-reader byte stream
///
/// A fixed-capacity circular buffer bridging exactly one producer
/// thread and one consumer thread, with blocking reads and writes.
/// Bytes arrive in write order.  The pipe object itself is only the
/// connector: [`BoundedBytePipe::writer`] and
/// [`BoundedBytePipe::reader`] each hand out the single endpoint
/// handle, and asking twice fails with
/// [`SyncError::AlreadyConnected`].  [`bounded`] is the pre-connected
/// shorthand.
///
/// Closing the writer is a half-close: buffered bytes remain readable
/// and the reader then sees end-of-stream.  Closing the reader
/// discards buffered bytes and makes further writes fail.  Dropping a
/// handle closes it; dropping a handle during a panic instead marks
/// that side's thread as gone, and the peer's blocked call fails with
/// [`SyncError::BrokenPipe`] rather than blocking forever.
///
/// ```
/// use threadlink::bounded;
///
/// let (mut w, mut r) = bounded(4);
/// let t = std::thread::spawn(move || {
///     w.write(b"hello pipe").unwrap();
///     // Dropping the writer closes it
/// });
/// let mut v = Vec::new();
/// let mut buf = [0u8; 3];
/// loop {
///     match r.read(&mut buf).unwrap() {
///         0 => break,
///         n => v.extend_from_slice(&buf[..n]),
///     }
/// }
/// assert_eq!(v, b"hello pipe");
/// t.join().unwrap();
/// ```
///
/// [`BoundedBytePipe::reader`]: struct.BoundedBytePipe.html#method.reader
/// [`BoundedBytePipe::writer`]: struct.BoundedBytePipe.html#method.writer
/// [`SyncError::AlreadyConnected`]: enum.SyncError.html#variant.AlreadyConnected
/// [`SyncError::BrokenPipe`]: enum.SyncError.html#variant.BrokenPipe
/// [`bounded`]: fn.bounded.html
pub struct BoundedBytePipe {
    inner: Arc<PipeInner>,
}

impl BoundedBytePipe {
    /// Create an unconnected pipe with the default capacity of 1024
    /// bytes
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an unconnected pipe with the given buffer capacity
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "pipe capacity must be at least 1");
        Self {
            inner: Arc::new(PipeInner {
                lock: Mutex::new(PipeBuf {
                    buf: vec![0; capacity].into_boxed_slice(),
                    in_pos: None,
                    out_pos: 0,
                    closed_by_writer: false,
                    closed_by_reader: false,
                    writer_gone: false,
                    reader_gone: false,
                    writer_taken: false,
                    reader_taken: false,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Connect the producer side.  One-time: a second request fails
    /// with [`SyncError::AlreadyConnected`].
    ///
    /// [`SyncError::AlreadyConnected`]: enum.SyncError.html#variant.AlreadyConnected
    pub fn writer(&self) -> Result<PipeWriter, SyncError> {
        let mut buf = self.inner.lock.lock();
        if buf.writer_taken {
            return Err(SyncError::AlreadyConnected);
        }
        buf.writer_taken = true;
        Ok(PipeWriter {
            inner: self.inner.clone(),
            closed: false,
        })
    }

    /// Connect the consumer side.  One-time: a second request fails
    /// with [`SyncError::AlreadyConnected`].
    ///
    /// [`SyncError::AlreadyConnected`]: enum.SyncError.html#variant.AlreadyConnected
    pub fn reader(&self) -> Result<PipeReader, SyncError> {
        let mut buf = self.inner.lock.lock();
        if buf.reader_taken {
            return Err(SyncError::AlreadyConnected);
        }
        buf.reader_taken = true;
        Ok(PipeReader {
            inner: self.inner.clone(),
            closed: false,
        })
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.inner.lock.lock().buf.len()
    }
}

impl Default for BoundedBytePipe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BoundedBytePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buf = self.inner.lock.lock();
        f.debug_struct("BoundedBytePipe")
            .field("capacity", &buf.buf.len())
            .field("available", &buf.available())
            .field("closed_by_writer", &buf.closed_by_writer)
            .field("closed_by_reader", &buf.closed_by_reader)
            .finish()
    }
}

/// Create a connected pipe pair with the given buffer capacity
pub fn bounded(capacity: usize) -> (PipeWriter, PipeReader) {
    let pipe = BoundedBytePipe::with_capacity(capacity);
    // Both ends of a fresh pipe are necessarily free
    let writer = pipe.writer().expect("fresh pipe writer end taken");
    let reader = pipe.reader().expect("fresh pipe reader end taken");
    (writer, reader)
}

/// Producer end of a [`BoundedBytePipe`]
///
/// [`BoundedBytePipe`]: struct.BoundedBytePipe.html
pub struct PipeWriter {
    inner: Arc<PipeInner>,
    closed: bool,
}

impl PipeWriter {
    /// Copy `bytes` into the pipe, in order.  Blocks while the buffer
    /// is full, waking periodically to re-check for space, closure and
    /// peer liveness; a write larger than the free contiguous region
    /// proceeds in multiple internal steps, wrapping at the capacity
    /// boundary.  Fails with [`SyncError::ClosedPipe`] once either end
    /// is closed and [`SyncError::BrokenPipe`] once the reader's
    /// thread is gone; bytes already transferred stay in the buffer.
    ///
    /// [`SyncError::BrokenPipe`]: enum.SyncError.html#variant.BrokenPipe
    /// [`SyncError::ClosedPipe`]: enum.SyncError.html#variant.ClosedPipe
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SyncError> {
        let mut rest = bytes;
        let mut buf = self.inner.lock.lock();
        while !rest.is_empty() {
            if self.closed || buf.closed_by_writer || buf.closed_by_reader {
                return Err(SyncError::ClosedPipe);
            }
            if buf.reader_gone {
                return Err(SyncError::BrokenPipe);
            }
            let n = buf.write_some(rest);
            if n > 0 {
                rest = &rest[n..];
                self.inner.cond.notify_all();
            } else {
                self.inner.cond.wait_for(&mut buf, POLL_INTERVAL);
            }
        }
        Ok(())
    }

    /// Write a single byte.  Blocks while the buffer is full.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), SyncError> {
        self.write(&[byte])
    }

    /// Half-close: no further writes are accepted, buffered bytes are
    /// still delivered, and the reader then sees end-of-stream.
    /// Blocked readers are woken so they can observe it.  Idempotent;
    /// dropping the writer has the same effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inner.lock.lock().closed_by_writer = true;
        self.inner.cond.notify_all();
        lifecycle_log!("pipe writer closed");
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if std::thread::panicking() {
            // The writing thread died rather than closing; readers
            // must see a broken pipe once the buffer drains, not a
            // clean end-of-stream
            self.inner.lock.lock().writer_gone = true;
            self.inner.cond.notify_all();
        } else {
            self.close();
        }
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PipeWriter::write(self, buf).map_err(io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Bytes are visible to the reader as soon as they are copied
        Ok(())
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("closed", &self.closed)
            .finish()
    }
}

/// Consumer end of a [`BoundedBytePipe`]
///
/// [`BoundedBytePipe`]: struct.BoundedBytePipe.html
pub struct PipeReader {
    inner: Arc<PipeInner>,
    closed: bool,
}

impl PipeReader {
    /// Read into `dst`, blocking while the pipe is empty and the
    /// writer has not closed.  Returns the bytes transferred in one
    /// contiguous pass, which may be fewer than `dst.len()` (the copy
    /// stops at the buffer's wrap boundary).  Returns `Ok(0)` for
    /// end-of-stream once the writer has closed and the buffer has
    /// drained; end-of-stream is not an error.  Fails with
    /// [`SyncError::BrokenPipe`] if the buffer is empty and the
    /// writer's thread is gone without a close.
    ///
    /// [`SyncError::BrokenPipe`]: enum.SyncError.html#variant.BrokenPipe
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, SyncError> {
        if dst.is_empty() {
            return Ok(0);
        }
        let mut buf = self.inner.lock.lock();
        loop {
            if self.closed || buf.closed_by_reader {
                return Err(SyncError::ClosedPipe);
            }
            let n = buf.read_some(dst);
            if n > 0 {
                // Space freed; wake a blocked writer
                self.inner.cond.notify_all();
                return Ok(n);
            }
            if buf.closed_by_writer {
                return Ok(0);
            }
            if buf.writer_gone {
                return Err(SyncError::BrokenPipe);
            }
            self.inner.cond.wait_for(&mut buf, POLL_INTERVAL);
        }
    }

    /// Read a single byte; `Ok(None)` is end-of-stream
    pub fn read_byte(&mut self) -> Result<Option<u8>, SyncError> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Bytes currently buffered.  A snapshot.
    pub fn available(&self) -> usize {
        self.inner.lock.lock().available()
    }

    /// Close the consumer end: buffered bytes are discarded and
    /// subsequent writes fail with [`SyncError::ClosedPipe`].
    /// Idempotent; dropping the reader has the same effect.
    ///
    /// [`SyncError::ClosedPipe`]: enum.SyncError.html#variant.ClosedPipe
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        {
            let mut buf = self.inner.lock.lock();
            buf.closed_by_reader = true;
            buf.in_pos = None;
            buf.out_pos = 0;
        }
        self.inner.cond.notify_all();
        lifecycle_log!("pipe reader closed");
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if std::thread::panicking() {
            // The reading thread died; writers must see a broken pipe,
            // not a clean close
            self.inner.lock.lock().reader_gone = true;
            self.inner.cond.notify_all();
        } else {
            self.close();
        }
    }
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        PipeReader::read(self, buf).map_err(io_error)
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader")
            .field("closed", &self.closed)
            .finish()
    }
}

fn io_error(err: SyncError) -> io::Error {
    let kind = match err {
        SyncError::BrokenPipe => io::ErrorKind::BrokenPipe,
        SyncError::ClosedPipe => io::ErrorKind::NotConnected,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}
