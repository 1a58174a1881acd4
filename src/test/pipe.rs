//! Test `BoundedBytePipe` functionality

use crate::{bounded, BoundedBytePipe, SyncError, DEFAULT_CAPACITY};
use std::thread;
use std::time::Duration;

#[test]
fn default_capacity() {
    let pipe = BoundedBytePipe::new();
    assert_eq!(pipe.capacity(), DEFAULT_CAPACITY);
    assert_eq!(BoundedBytePipe::with_capacity(7).capacity(), 7);
}

#[test]
fn endpoints_connect_once() {
    let pipe = BoundedBytePipe::with_capacity(8);
    let _writer = pipe.writer().unwrap();
    let _reader = pipe.reader().unwrap();
    assert!(matches!(pipe.writer(), Err(SyncError::AlreadyConnected)));
    assert!(matches!(pipe.reader(), Err(SyncError::AlreadyConnected)));
}

#[test]
fn single_bytes_roundtrip() {
    let (mut w, mut r) = bounded(8);
    w.write_byte(0x41).unwrap();
    w.write_byte(0x42).unwrap();
    assert_eq!(r.available(), 2);
    assert_eq!(r.read_byte().unwrap(), Some(0x41));
    assert_eq!(r.read_byte().unwrap(), Some(0x42));
    w.close();
    assert_eq!(r.read_byte().unwrap(), None);
}

// Write a sequence much longer than the buffer so the circular buffer
// wraps repeatedly, and check the reader reconstructs it exactly.
#[test]
fn roundtrip_with_wraparound() {
    let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
    let (mut w, mut r) = bounded(7);
    let expect = data.clone();
    let writer = thread::spawn(move || {
        w.write(&data).unwrap();
        w.close();
    });

    let mut got = Vec::new();
    let mut buf = [0u8; 5];
    loop {
        match r.read(&mut buf).unwrap() {
            0 => break,
            n => got.extend_from_slice(&buf[..n]),
        }
    }
    assert_eq!(got, expect);
    writer.join().unwrap();
}

// Scenario from the original design: capacity-4 pipe, [1,2,3,4,5,6]
// written in one call, read in chunks of at most 3.
#[test]
fn small_pipe_chunked_reads() {
    let (mut w, mut r) = bounded(4);
    let writer = thread::spawn(move || {
        w.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        w.close();
    });

    let mut got = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        assert!(n <= 3);
        got.extend_from_slice(&buf[..n]);
    }
    assert_eq!(got, [1, 2, 3, 4, 5, 6]);
    writer.join().unwrap();
}

#[test]
fn close_drains_then_eof() {
    let (mut w, mut r) = bounded(16);
    w.write(&[9, 8, 7]).unwrap();
    w.close();
    // Buffered bytes are still delivered after the close
    let mut buf = [0u8; 16];
    assert_eq!(r.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &[9, 8, 7]);
    // End-of-stream is sticky and not an error
    assert_eq!(r.read(&mut buf).unwrap(), 0);
    assert_eq!(r.read(&mut buf).unwrap(), 0);
}

#[test]
fn blocked_reader_wakes_on_close() {
    let (mut w, mut r) = bounded(4);
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 4];
        r.read(&mut buf)
    });
    thread::sleep(Duration::from_millis(50));
    w.close();
    assert_eq!(reader.join().unwrap().unwrap(), 0);
}

#[test]
fn write_after_close_fails() {
    let (mut w, _r) = bounded(4);
    w.close();
    assert!(matches!(w.write(&[1]), Err(SyncError::ClosedPipe)));
}

#[test]
fn reader_close_discards_and_rejects_writes() {
    let (mut w, mut r) = bounded(8);
    w.write(&[1, 2, 3]).unwrap();
    r.close();
    assert_eq!(r.available(), 0);
    assert!(matches!(w.write(&[4]), Err(SyncError::ClosedPipe)));
    assert!(matches!(r.read(&mut [0u8; 4]), Err(SyncError::ClosedPipe)));
}

#[test]
fn dropping_writer_closes_cleanly() {
    let (w, mut r) = bounded(4);
    drop(w);
    assert_eq!(r.read(&mut [0u8; 4]).unwrap(), 0);
}

// A writer thread that panics without closing must surface as a broken
// pipe to the reader, but only after buffered bytes have drained.
#[test]
fn dead_writer_breaks_pipe_after_drain() {
    let (mut w, mut r) = bounded(8);
    let writer = thread::spawn(move || {
        w.write(&[1, 2]).unwrap();
        panic!("writer thread died");
    });
    assert!(writer.join().is_err());

    let mut buf = [0u8; 8];
    assert_eq!(r.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], &[1, 2]);
    assert!(matches!(r.read(&mut buf), Err(SyncError::BrokenPipe)));
}

#[test]
fn dead_reader_breaks_pipe_for_writer() {
    let (mut w, r) = bounded(4);
    let reader = thread::spawn(move || {
        let _r = r;
        panic!("reader thread died");
    });
    assert!(reader.join().is_err());
    assert!(matches!(w.write(&[1]), Err(SyncError::BrokenPipe)));
}

// A writer blocked on a full buffer must notice the reader dying
// rather than blocking forever.
#[test]
fn blocked_writer_notices_dead_reader() {
    let (mut w, r) = bounded(2);
    w.write(&[1, 2]).unwrap();
    let reader = thread::spawn(move || {
        let _r = r;
        thread::sleep(Duration::from_millis(50));
        panic!("reader thread died");
    });
    match w.write(&[3]) {
        Err(SyncError::BrokenPipe) => {}
        other => panic!("Expected broken pipe, got {:?}", other),
    }
    assert!(reader.join().is_err());
}

#[test]
fn io_trait_adapters() {
    use std::io::{Read, Write};

    let (mut w, mut r) = bounded(4);
    let writer = thread::spawn(move || {
        w.write_all(b"through the io traits").unwrap();
        w.flush().unwrap();
    });
    let mut got = Vec::new();
    r.read_to_end(&mut got).unwrap();
    assert_eq!(got, b"through the io traits");
    writer.join().unwrap();
}

#[test]
fn fifo_order_under_concurrency() {
    let data: Vec<u8> = (0u16..2048).map(|v| (v % 251) as u8).collect();
    let expect = data.clone();
    let (mut w, mut r) = bounded(32);
    let writer = thread::spawn(move || {
        // Many small writes instead of one large one
        for chunk in data.chunks(11) {
            w.write(chunk).unwrap();
        }
        w.close();
    });

    let mut got = Vec::new();
    let mut buf = [0u8; 13];
    loop {
        match r.read(&mut buf).unwrap() {
            0 => break,
            n => got.extend_from_slice(&buf[..n]),
        }
    }
    assert_eq!(got, expect);
    writer.join().unwrap();
}
