//! Shared output destination for protocol blocks.

use collector_error::Result;
use parking_lot::Mutex as SyncMutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A single writable destination shared by every job.
///
/// Clones share the same underlying writer and lock. Each call to
/// [`OutputSink::write_block`] holds the lock for exactly one write + flush,
/// so one job's block is never interleaved with another's.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl OutputSink {
    /// Wrap any async writer
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Sink writing to the process' stdout, the usual plugin transport
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Write one protocol block atomically with respect to other writers.
    ///
    /// Empty blocks are skipped without taking the lock.
    pub async fn write_block(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut writer = self.inner.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        trace!(bytes = data.len(), "flushed protocol block");
        Ok(())
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// In-memory writer whose clones share one buffer.
///
/// Handy as the target of an [`OutputSink`] when the produced protocol
/// stream needs to be inspected.
#[derive(Clone, Default, Debug)]
pub struct MemoryWriter {
    data: Arc<SyncMutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock()).into_owned()
    }

    /// Drain everything written so far
    pub fn take(&self) -> String {
        let data = std::mem::take(&mut *self.data.lock());
        String::from_utf8_lossy(&data).into_owned()
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.data.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes at most a few bytes per poll and yields in between, so that
    /// unsynchronized writers would interleave.
    struct TrickleWriter {
        inner: MemoryWriter,
        ready: bool,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if !self.ready {
                self.ready = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            self.ready = false;
            let n = buf.len().min(3);
            self.inner.data.lock().extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_block() {
        let memory = MemoryWriter::new();
        let sink = OutputSink::new(memory.clone());

        sink.write_block(b"BEGIN 'a.b' 0\nEND\n\n").await.unwrap();
        sink.write_block(b"").await.unwrap();

        assert_eq!(memory.contents(), "BEGIN 'a.b' 0\nEND\n\n");
        assert_eq!(memory.take(), "BEGIN 'a.b' 0\nEND\n\n");
        assert!(memory.contents().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_blocks_do_not_interleave() {
        let memory = MemoryWriter::new();
        let sink = OutputSink::new(TrickleWriter {
            inner: memory.clone(),
            ready: false,
        });

        let mut tasks = Vec::new();
        for i in 0..8 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                let block = format!("BEGIN 'job{i}.chart' 0\nSET 'dim' = {i}\nEND\n\n");
                sink.write_block(block.as_bytes()).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let output = memory.contents();
        let blocks: Vec<&str> = output.split_terminator("\n\n").collect();
        assert_eq!(blocks.len(), 8);
        for block in blocks {
            let lines: Vec<&str> = block.lines().collect();
            assert_eq!(lines.len(), 3);
            let job = lines[0]
                .strip_prefix("BEGIN 'job")
                .and_then(|rest| rest.strip_suffix(".chart' 0"))
                .unwrap();
            assert_eq!(lines[1], format!("SET 'dim' = {job}"));
            assert_eq!(lines[2], "END");
        }
    }

    #[tokio::test]
    async fn test_write_error_is_reported() {
        let sink = OutputSink::new(FailingWriter);
        assert!(sink.write_block(b"END\n").await.is_err());
    }
}
