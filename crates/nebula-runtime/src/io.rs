use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// The output and error streams of an action.
///
/// Writes are serialized per stream, so concurrent log pumps for the same
/// action never interleave within a single chunk.
pub struct RuntimeIo {
  out: Mutex<OutputStream>,
  err_out: Mutex<OutputStream>,
}

impl RuntimeIo {
  pub fn new(
    out: impl AsyncWrite + Send + Unpin + 'static,
    err_out: impl AsyncWrite + Send + Unpin + 'static,
  ) -> Self {
    Self {
      out: Mutex::new(Box::new(out)),
      err_out: Mutex::new(Box::new(err_out)),
    }
  }

  /// Streams bound to the process's stdout and stderr.
  pub fn stdio() -> Self {
    Self::new(tokio::io::stdout(), tokio::io::stderr())
  }

  /// Streams that drop everything written to them.
  pub fn discard() -> Self {
    Self::new(tokio::io::sink(), tokio::io::sink())
  }

  /// Write a chunk to the output stream and flush it.
  pub async fn write_out(&self, bytes: &[u8]) -> io::Result<()> {
    let mut out = self.out.lock().await;
    out.write_all(bytes).await?;
    out.flush().await
  }

  /// Write a chunk to the error stream and flush it.
  pub async fn write_err(&self, bytes: &[u8]) -> io::Result<()> {
    let mut err_out = self.err_out.lock().await;
    err_out.write_all(bytes).await?;
    err_out.flush().await
  }

  /// Copy a reader into the output stream until EOF, chunk by chunk.
  pub async fn copy_out<R: AsyncRead + Unpin>(&self, reader: R) -> io::Result<u64> {
    copy_chunks(reader, &self.out).await
  }

  /// Copy a reader into the error stream until EOF, chunk by chunk.
  pub async fn copy_err<R: AsyncRead + Unpin>(&self, reader: R) -> io::Result<u64> {
    copy_chunks(reader, &self.err_out).await
  }
}

// The stream lock is held per chunk only, so output and error pumps of
// one action can run side by side.
async fn copy_chunks<R: AsyncRead + Unpin>(
  mut reader: R,
  stream: &Mutex<OutputStream>,
) -> io::Result<u64> {
  let mut buf = vec![0u8; 8 * 1024];
  let mut total = 0u64;
  loop {
    let n = reader.read(&mut buf).await?;
    if n == 0 {
      return Ok(total);
    }
    let mut out = stream.lock().await;
    out.write_all(&buf[..n]).await?;
    out.flush().await?;
    total += n as u64;
  }
}

impl std::fmt::Debug for RuntimeIo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RuntimeIo").finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::SharedBuffer;

  #[tokio::test]
  async fn test_streams_are_separate() {
    let out = SharedBuffer::new();
    let err = SharedBuffer::new();
    let io = RuntimeIo::new(out.clone(), err.clone());

    io.write_out(b"hello ").await.unwrap();
    io.write_err(b"oops").await.unwrap();
    io.write_out(b"world").await.unwrap();

    assert_eq!(out.to_string_lossy(), "hello world");
    assert_eq!(err.to_string_lossy(), "oops");
  }

  #[tokio::test]
  async fn test_copy_out_reads_to_eof() {
    let out = SharedBuffer::new();
    let io = RuntimeIo::new(out.clone(), tokio::io::sink());

    let copied = io.copy_out(&b"line one\nline two\n"[..]).await.unwrap();

    assert_eq!(copied, 18);
    assert_eq!(out.to_string_lossy(), "line one\nline two\n");
  }

  #[tokio::test]
  async fn test_discard_accepts_writes() {
    let io = RuntimeIo::discard();
    io.write_out(b"ignored").await.unwrap();
    io.write_err(b"ignored").await.unwrap();
  }
}
