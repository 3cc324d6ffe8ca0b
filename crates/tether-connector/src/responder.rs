//! Serving requests issued by the remote end of a session.

use std::sync::Arc;
use tether_identity::Peer;
use tether_protocol::{Request, Response};
use tether_repo::Repository;
use tracing::trace;

/// Answers requests arriving on a session.
///
/// Called from the session task, so implementations must not block.
pub trait Responder: Send + Sync + 'static {
    /// Produces the response to `request` sent by `remote`.
    fn respond(&self, remote: &Peer, request: Request) -> Response;
}

/// Answers from the local repository.
pub struct RepoResponder {
    repo: Arc<dyn Repository>,
}

impl RepoResponder {
    /// Creates a responder serving `repo`.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

impl Responder for RepoResponder {
    fn respond(&self, remote: &Peer, request: Request) -> Response {
        trace!(remote = %remote.id, request = request.name(), "Serving request");
        match request {
            Request::StoreVersion => match self.repo.store_version() {
                0 => Response::Error {
                    message: "store is not initialized".into(),
                },
                version => Response::StoreVersion { version },
            },
            Request::Ping { nonce } => Response::Pong { nonce },
        }
    }
}
