//! Progress-logging reader for externally supplied upload streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Wraps an `AsyncRead` and logs progress at 5% increments when the total
/// size is known up front.
pub struct ProgressReader<R> {
    inner: R,
    total_bytes: Option<u64>,
    read_bytes: u64,
    next_log_percent: u64,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total_bytes: Option<u64>) -> Self {
        Self {
            inner,
            total_bytes,
            read_bytes: 0,
            next_log_percent: 5,
        }
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let me = &mut *self;

        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = (buf.filled().len() - before) as u64;
                me.read_bytes += n;

                if let Some(total) = me.total_bytes {
                    if total > 0 && n > 0 {
                        let percent = me.read_bytes * 100 / total;
                        if percent >= me.next_log_percent {
                            tracing::info!(percent, bytes = me.read_bytes, "upload progress");
                            me.next_log_percent = percent - percent % 5 + 5;
                        }
                    }
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
