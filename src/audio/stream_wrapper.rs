use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io::{self, Read, Seek, SeekFrom};
use std::pin::Pin;
use std::sync::Mutex;
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const LOG_TARGET: &str = "r_jukebox::audio::stream_wrapper";

/// Raw, still-encoded audio bytes as handed over by a resolver.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Adapts an async byte stream to Symphonia's blocking `MediaSource`.
///
/// A pump task forwards chunks through a bounded channel, so the remote
/// source is only read as fast as the decoder consumes it. Reads block the
/// calling thread and must happen inside `spawn_blocking`.
pub struct ChannelMediaSource {
    chunks: Mutex<mpsc::Receiver<io::Result<Bytes>>>,
    current: Bytes,
    position: u64,
    byte_len: Option<u64>,
}

impl ChannelMediaSource {
    /// Starts pumping `stream` and returns the readable end. Dropping the
    /// returned handle stops the pump.
    pub fn spawn(stream: ByteStream, capacity: usize, byte_len: Option<u64>) -> (Self, PumpHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump_chunks(stream, tx));
        let source = Self {
            chunks: Mutex::new(rx),
            current: Bytes::new(),
            position: 0,
            byte_len,
        };
        (source, PumpHandle(pump))
    }
}

/// Aborts the pump task when dropped, including when an `open` in progress
/// is cancelled.
#[derive(Debug)]
pub struct PumpHandle(JoinHandle<()>);

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn pump_chunks(mut stream: ByteStream, tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        if let Ok(bytes) = &chunk {
            total += bytes.len();
            trace!(target: LOG_TARGET, "Forwarding {} bytes (total {})", bytes.len(), total);
        }
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() {
            debug!(target: LOG_TARGET, "Decoder dropped its source after {} bytes; stopping pump.", total);
            return;
        }
        if failed {
            return;
        }
    }
    debug!(target: LOG_TARGET, "Source stream complete ({} bytes).", total);
}

impl Read for ChannelMediaSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            let rx = self.chunks.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
            match rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ChannelMediaSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(io::ErrorKind::Unsupported, "stream source is not seekable")),
        }
    }
}

impl MediaSource for ChannelMediaSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}
