use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// An in-memory, cloneable sink for capturing action output.
///
/// All clones share the same buffer, so one handle can be given to a
/// [`RuntimeIo`](crate::RuntimeIo) while another reads back what was written.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
  inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  /// A copy of everything written so far.
  pub fn contents(&self) -> Vec<u8> {
    self.lock().clone()
  }

  pub fn to_string_lossy(&self) -> String {
    String::from_utf8_lossy(&self.lock()).into_owned()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl AsyncWrite for SharedBuffer {
  fn poll_write(
    self: Pin<&mut Self>,
    _cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    self.lock().extend_from_slice(buf);
    Poll::Ready(Ok(buf.len()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }
}
