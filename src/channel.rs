//! Rendezvous channel carrying rendered frames to the display thread.
//!
//! The channel has zero capacity: a render loop's `send` blocks until the
//! display thread takes the frame. Any number of senders may feed the single
//! receiver; frames from one sender arrive in the order they were sent.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Clear the whole screen and home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// A complete terminal write: one rendered frame or a control sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct FormattedFrame(String);

impl FormattedFrame {
    pub fn new(contents: String) -> Self {
        Self(contents)
    }

    /// The one-off screen clear issued before any stream is drawn.
    pub fn clear_screen() -> Self {
        Self(CLEAR_SCREEN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Escape sequences make the raw string unreadable in test failures.
impl fmt::Debug for FormattedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormattedFrame({:?})", self.0)
    }
}

/// The receiving side has been dropped.
#[derive(Debug, thiserror::Error)]
#[error("display thread is no longer receiving frames")]
pub struct OutputClosed(pub FormattedFrame);

/// Producer handle, one clone per render loop.
#[derive(Debug, Clone)]
pub struct FrameSender {
    inner: SyncSender<FormattedFrame>,
}

impl FrameSender {
    /// Hand `frame` to the display thread, blocking until it is accepted.
    pub fn send(&self, frame: FormattedFrame) -> Result<(), OutputClosed> {
        self.inner.send(frame).map_err(|e| OutputClosed(e.0))
    }
}

/// Consumer handle, owned by the display thread.
#[derive(Debug)]
pub struct FrameReceiver {
    inner: Receiver<FormattedFrame>,
}

impl FrameReceiver {
    /// Wait for the next frame. Returns `None` once every sender is dropped.
    pub fn recv(&self) -> Option<FormattedFrame> {
        self.inner.recv().ok()
    }

    /// Blocking iterator over received frames.
    pub fn iter(&self) -> impl Iterator<Item = FormattedFrame> + '_ {
        self.inner.iter()
    }
}

/// Create the shared output channel.
pub fn output_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::sync_channel(0);
    (FrameSender { inner: tx }, FrameReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clear_screen_sequence() {
        assert_eq!(FormattedFrame::clear_screen().as_str(), "\x1b[H\x1b[2J");
    }

    #[test]
    fn test_send_blocks_until_received() {
        let (tx, rx) = output_channel();
        let producer = thread::spawn(move || {
            tx.send(FormattedFrame::new("a".to_string())).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished(), "send returned before a receiver was ready");

        assert_eq!(rx.recv().unwrap().as_str(), "a");
        producer.join().unwrap();
    }

    #[test]
    fn test_recv_none_after_all_senders_dropped() {
        let (tx, rx) = output_channel();
        let tx2 = tx.clone();
        drop(tx);
        drop(tx2);
        assert!(rx.recv().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped_returns_frame() {
        let (tx, rx) = output_channel();
        drop(rx);
        let err = tx.send(FormattedFrame::new("lost".to_string())).unwrap_err();
        assert_eq!(err.0.as_str(), "lost");
    }

    #[test]
    fn test_single_producer_order_preserved() {
        let (tx, rx) = output_channel();
        let producer = thread::spawn(move || {
            for i in 0..50 {
                tx.send(FormattedFrame::new(i.to_string())).unwrap();
            }
        });

        let received: Vec<String> = rx.iter().map(FormattedFrame::into_string).collect();
        producer.join().unwrap();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_multiple_producers_all_delivered() {
        let (tx, rx) = output_channel();
        let handles: Vec<_> = (0..3)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        tx.send(FormattedFrame::new(format!("{p}:{i}"))).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        let received: Vec<String> = rx.iter().map(FormattedFrame::into_string).collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(received.len(), 30);

        // Per-producer order holds even though producers interleave.
        for p in 0..3 {
            let prefix = format!("{p}:");
            let seq: Vec<u32> = received
                .iter()
                .filter_map(|s| s.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..10).collect::<Vec<_>>());
        }
    }
}
