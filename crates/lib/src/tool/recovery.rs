//! Interactive recovery hand-off.
//!
//! When the converter cannot be started because the executable is missing, the
//! build worker asks the UI-owning side for a replacement path and waits for
//! the answer. Requests travel over a bounded channel and each carries a
//! one-shot reply slot, so the worker stays parked until the UI responds.
//! A dropped server or an unanswered request counts as a cancellation.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// The UI's answer to a recovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryResponse {
  /// The user picked this executable.
  Selected(PathBuf),
  /// The user declined to pick one.
  Cancelled,
}

/// A pending request for a replacement converter path.
#[derive(Debug)]
pub struct RecoveryRequest {
  /// Bare name of the converter that was looked for.
  pub tool: String,
  /// The path that failed to launch.
  pub attempted: PathBuf,
  reply: oneshot::Sender<RecoveryResponse>,
}

impl RecoveryRequest {
  /// Answer the request, waking the waiting worker.
  pub fn respond(self, response: RecoveryResponse) {
    if self.reply.send(response).is_err() {
      debug!(tool = %self.tool, "recovery requester went away before the reply");
    }
  }
}

/// Build-worker side of the channel.
#[derive(Debug, Clone)]
pub struct RecoveryClient {
  requests: mpsc::Sender<RecoveryRequest>,
}

impl RecoveryClient {
  /// Ask for a replacement path and wait for the answer.
  pub async fn request(&self, tool: &str, attempted: &Path) -> RecoveryResponse {
    let (reply, response) = oneshot::channel();
    let request = RecoveryRequest {
      tool: tool.to_string(),
      attempted: attempted.to_path_buf(),
      reply,
    };

    if self.requests.send(request).await.is_err() {
      debug!(tool = %tool, "no recovery handler is listening");
      return RecoveryResponse::Cancelled;
    }

    response.await.unwrap_or(RecoveryResponse::Cancelled)
  }
}

/// UI side of the channel.
#[derive(Debug)]
pub struct RecoveryServer {
  requests: mpsc::Receiver<RecoveryRequest>,
}

impl RecoveryServer {
  /// Receive the next request, or `None` once every client is gone.
  pub async fn recv(&mut self) -> Option<RecoveryRequest> {
    self.requests.recv().await
  }

  /// Answer requests with `handler` on the current thread until every client is gone.
  ///
  /// Must not be called from within an async runtime.
  pub fn serve_blocking<F>(mut self, mut handler: F)
  where
    F: FnMut(&str, &Path) -> RecoveryResponse,
  {
    while let Some(request) = self.requests.blocking_recv() {
      let response = handler(&request.tool, &request.attempted);
      request.respond(response);
    }
  }
}

/// Create a connected client/server pair. One request is in flight at a time.
pub fn channel() -> (RecoveryClient, RecoveryServer) {
  let (tx, rx) = mpsc::channel(1);
  (RecoveryClient { requests: tx }, RecoveryServer { requests: rx })
}
