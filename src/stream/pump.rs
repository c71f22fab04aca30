//! Background pump that drains a reader into an in-memory backlog.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::PixelStream;
use crate::cancel::CancelToken;

/// Default backlog capacity, in frames.
pub const DEFAULT_BACKLOG_FRAMES: usize = 4;

/// Largest accepted backlog, in frames.
pub const MAX_BACKLOG_CAPACITY_FRAMES: usize = 240;

/// Largest single read from the upstream reader (64KB, same as a pipe buffer).
const READ_CHUNK: usize = 64 * 1024;

/// How often a blocked read re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

enum PumpState {
    Running,
    Eof,
    Failed(io::Error),
}

struct Backlog {
    data: VecDeque<u8>,
    state: PumpState,
    /// Set when the consuming side is dropped.
    detached: bool,
    /// Bytes handed to the consumer or discarded by it.
    consumed: u64,
    dropped_frames: u64,
}

impl Backlog {
    /// Drop the oldest whole frame that the consumer has not started on.
    ///
    /// Returns false when no such frame is buffered yet.
    fn drop_stale_frame(&mut self, frame_size: usize) -> bool {
        let into_frame = (self.consumed % frame_size as u64) as usize;
        let start = (frame_size - into_frame) % frame_size;
        if self.data.len() < start + frame_size {
            return false;
        }
        self.data.drain(start..start + frame_size);
        self.dropped_frames += 1;
        true
    }
}

struct Shared {
    backlog: Mutex<Backlog>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reader that buffers an upstream byte source on a dedicated thread.
///
/// The pump keeps reading while the consumer is busy rendering, so
/// [`PixelStream::buffered`] reflects how far behind the consumer really is.
/// Once the backlog is full the pump drops its oldest whole frame and keeps
/// reading, so stale frames never pile up in the upstream pipe.
pub struct BacklogReader {
    shared: Arc<Shared>,
    capacity: usize,
    cancel: Option<CancelToken>,
}

impl std::fmt::Debug for BacklogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacklogReader")
            .field("capacity", &self.capacity)
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}

impl BacklogReader {
    /// Start pumping `reader` into a backlog of at most `frames` frames of
    /// `frame_size` bytes.
    pub fn spawn<R>(reader: R, frame_size: usize, frames: usize) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let frame_size = frame_size.max(1);
        let capacity = frame_size.checked_mul(frames.max(1)).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("backlog of {} frames of {} bytes is too large", frames, frame_size),
            )
        })?;
        let shared = Arc::new(Shared {
            backlog: Mutex::new(Backlog {
                data: VecDeque::with_capacity(READ_CHUNK.min(capacity)),
                state: PumpState::Running,
                detached: false,
                consumed: 0,
                dropped_frames: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        });

        let pump_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("termvid-pump".to_string())
            .spawn(move || run_pump(reader, pump_shared, frame_size, capacity))?;

        Ok(Self {
            shared,
            capacity,
            cancel: None,
        })
    }

    /// Make blocked reads fail once `cancel` is set, instead of waiting for
    /// upstream data that may never come.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Maximum number of bytes the pump will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the upstream reader has finished (EOF or error).
    pub fn is_finished(&self) -> bool {
        !matches!(self.shared.lock().state, PumpState::Running)
    }
}

fn run_pump<R: Read>(mut reader: R, shared: Arc<Shared>, frame_size: usize, capacity: usize) {
    let mut chunk = vec![0u8; READ_CHUNK.min(capacity)];

    loop {
        let room = {
            let mut backlog = shared.lock();
            loop {
                if backlog.detached {
                    log::debug!(
                        "Backlog consumer dropped, stopping pump ({} stale frames dropped)",
                        backlog.dropped_frames
                    );
                    return;
                }
                if backlog.data.len() < capacity || backlog.drop_stale_frame(frame_size) {
                    break;
                }
                // Full, and the consumer is partway into every buffered frame.
                backlog = shared
                    .writable
                    .wait(backlog)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            capacity - backlog.data.len()
        };

        let limit = room.min(chunk.len());
        let result = reader.read(&mut chunk[..limit]);

        let mut backlog = shared.lock();
        match result {
            Ok(0) => {
                log::debug!("Upstream reached EOF");
                backlog.state = PumpState::Eof;
                shared.readable.notify_all();
                return;
            }
            Ok(n) => {
                backlog.data.extend(&chunk[..n]);
                shared.readable.notify_all();
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Upstream read failed: {}", e);
                backlog.state = PumpState::Failed(e);
                shared.readable.notify_all();
                return;
            }
        }
    }
}

impl Read for BacklogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut backlog = self.shared.lock();
        loop {
            if !backlog.data.is_empty() {
                let n = buf.len().min(backlog.data.len());
                for (dst, src) in buf.iter_mut().zip(backlog.data.drain(..n)) {
                    *dst = src;
                }
                backlog.consumed += n as u64;
                self.shared.writable.notify_all();
                return Ok(n);
            }

            match std::mem::replace(&mut backlog.state, PumpState::Eof) {
                PumpState::Running => {
                    backlog.state = PumpState::Running;
                    backlog = match &self.cancel {
                        Some(cancel) if cancel.is_cancelled() => {
                            return Err(io::Error::other("read cancelled"));
                        }
                        Some(_) => {
                            let (guard, _) = self
                                .shared
                                .readable
                                .wait_timeout(backlog, CANCEL_POLL)
                                .unwrap_or_else(PoisonError::into_inner);
                            guard
                        }
                        None => self
                            .shared
                            .readable
                            .wait(backlog)
                            .unwrap_or_else(PoisonError::into_inner),
                    };
                }
                PumpState::Eof => return Ok(0),
                // Reported once; later reads see EOF.
                PumpState::Failed(e) => return Err(e),
            }
        }
    }
}

impl PixelStream for BacklogReader {
    fn buffered(&self) -> usize {
        self.shared.lock().data.len()
    }

    fn discard(&mut self, n: usize) -> io::Result<usize> {
        let mut backlog = self.shared.lock();
        let n = n.min(backlog.data.len());
        backlog.data.drain(..n);
        backlog.consumed += n as u64;
        self.shared.writable.notify_all();
        Ok(n)
    }
}

impl Drop for BacklogReader {
    fn drop(&mut self) {
        // The pump may be blocked in an upstream read, so it is not joined;
        // it exits on its next wake-up.
        self.shared.lock().detached = true;
        self.shared.writable.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{extract_frame, StreamError};
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_backlog_accumulates_until_eof() {
        let reader = BacklogReader::spawn(Cursor::new(vec![9u8; 30]), 10, 10).unwrap();
        assert!(wait_until(|| reader.is_finished()));
        assert_eq!(reader.buffered(), 30);
    }

    #[test]
    fn test_backlog_respects_capacity() {
        let reader = BacklogReader::spawn(io::repeat(1), 12, 4).unwrap();
        assert_eq!(reader.capacity(), 48);
        assert!(wait_until(|| reader.buffered() == 48));
        thread::sleep(Duration::from_millis(20));
        assert!(reader.buffered() <= reader.capacity());
        assert!(!reader.is_finished());
    }

    #[test]
    fn test_read_drains_backlog_then_eof() {
        let data: Vec<u8> = (0..24).collect();
        let mut reader = BacklogReader::spawn(Cursor::new(data.clone()), 8, 8).unwrap();
        let mut out = vec![0; 24];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, data);

        let mut tail = [0u8; 1];
        assert_eq!(reader.read(&mut tail).unwrap(), 0);
    }

    #[test]
    fn test_discard_frees_room_for_pump() {
        let mut reader = BacklogReader::spawn(io::repeat(2), 12, 3).unwrap();
        assert!(wait_until(|| reader.buffered() == 36));
        assert_eq!(reader.discard(12).unwrap(), 12);
        assert!(wait_until(|| reader.buffered() == 36));
    }

    #[test]
    fn test_extract_trims_pump_backlog() {
        // 5 frames of 12 bytes, each filled with its index.
        let data: Vec<u8> = (0..5u8).flat_map(|i| vec![i; 12]).collect();
        let mut reader = BacklogReader::spawn(Cursor::new(data), 12, 10).unwrap();
        assert!(wait_until(|| reader.is_finished()));
        assert_eq!(reader.buffered(), 60);

        let mut frame = vec![0; 12];
        extract_frame(&mut reader, &mut frame).unwrap();
        assert_eq!(frame, vec![3; 12]);
        assert_eq!(reader.buffered(), 12);
    }

    #[test]
    fn test_partial_frame_then_eof_is_closed() {
        let mut reader = BacklogReader::spawn(Cursor::new(vec![0u8; 6]), 12, 5).unwrap();
        let mut frame = vec![0; 12];
        let err = extract_frame(&mut reader, &mut frame).unwrap_err();
        assert!(matches!(err, StreamError::Closed));
    }

    #[test]
    fn test_upstream_error_surfaces_once() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let mut reader = BacklogReader::spawn(Broken, 16, 4).unwrap();
        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_cancel_wakes_blocked_read() {
        let (_upstream_open, chunks) = std::sync::mpsc::channel();
        let feed = Feed {
            chunks,
            pending: Vec::new(),
        };
        let cancel = CancelToken::new();
        let mut reader = BacklogReader::spawn(feed, 4, 3)
            .unwrap()
            .with_cancel(cancel.clone());

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });

        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        canceller.join().unwrap();
    }

    #[test]
    fn test_oversized_backlog_is_rejected() {
        let err = BacklogReader::spawn(Cursor::new(Vec::new()), usize::MAX / 2, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_full_backlog_drops_oldest_frames() {
        // 10 frames of 4 bytes into room for 3: only the newest survive.
        let data: Vec<u8> = (0..10u8).flat_map(|i| vec![i; 4]).collect();
        let mut reader = BacklogReader::spawn(Cursor::new(data), 4, 3).unwrap();
        assert!(wait_until(|| reader.is_finished()));
        assert_eq!(reader.buffered(), 12);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, [7, 7, 7, 7, 8, 8, 8, 8, 9, 9, 9, 9]);
    }

    /// Upstream fed chunk by chunk from a channel; EOF once the sender is gone.
    struct Feed {
        chunks: std::sync::mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for Feed {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.chunks.recv() {
                    Ok(chunk) => self.pending = chunk,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn test_full_backlog_never_drops_a_frame_being_read() {
        let (tx, rx) = std::sync::mpsc::channel();
        let feed = Feed {
            chunks: rx,
            pending: Vec::new(),
        };
        let mut reader = BacklogReader::spawn(feed, 4, 3).unwrap();

        // Consumer takes the first half of frame 0.
        tx.send(vec![0, 0]).unwrap();
        let mut head = [9u8; 2];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(head, [0, 0]);

        // Rest of frame 0, then frames 1..=5, overflowing the backlog.
        let mut rest = vec![0, 0];
        for i in 1..=5u8 {
            rest.extend_from_slice(&[i; 4]);
        }
        tx.send(rest).unwrap();
        drop(tx);
        assert!(wait_until(|| reader.is_finished()));

        let mut tail = [9u8; 2];
        reader.read_exact(&mut tail).unwrap();
        assert_eq!(tail, [0, 0]);

        let mut frames = Vec::new();
        reader.read_to_end(&mut frames).unwrap();
        assert_eq!(frames.len() % 4, 0);
        let values: Vec<u8> = frames
            .chunks(4)
            .map(|frame| {
                assert!(frame.iter().all(|&b| b == frame[0]), "torn frame {:?}", frame);
                frame[0]
            })
            .collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values.last(), Some(&5));
    }
}
