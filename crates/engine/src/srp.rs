// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State Relay Protocol (SRP): a one-shot rendezvous over a Unix domain
//! socket, used by the incoming candidate to receive the outgoing
//! process's in-memory state during `HANDSHAKING`.
//!
//! Grounded on `examples/original_source/internal/srp/relay.go`, whose
//! own comment settles the wire-format "implementation decision" left
//! open by `spec.md` §4.4: *"In production, use Protobuf for
//! efficiency. Here using JSON for readability."* — this is kept as
//! the concrete choice rather than revisited, since both ends must
//! agree and JSON is what the rest of this codebase already uses for
//! wire data (`aeterna_core::context::Value`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;

use aeterna_core::context::StateContext;
use aeterna_core::error::EngineError;

/// Receiving half of the relay. Lives on the candidate process.
pub struct StateRelay {
    socket_path: PathBuf,
}

impl StateRelay {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    /// Bind the rendezvous endpoint, wait for exactly one connection,
    /// and decode one self-delimited JSON frame from it. The endpoint
    /// is removed whether this call succeeds, times out, or fails to
    /// decode.
    pub async fn wait_state_transfer(
        &self,
        timeout: Duration,
    ) -> Result<StateContext, EngineError> {
        let listener = self.bind().map_err(|e| EngineError::SocketBindFailed(
            self.socket_path.display().to_string(),
            e,
        ))?;

        let outcome = tokio::time::timeout(timeout, self.accept_and_decode(&listener)).await;
        let _ = std::fs::remove_file(&self.socket_path);

        match outcome {
            Ok(inner) => inner,
            Err(_) => Err(EngineError::StateDumpTimeout(timeout)),
        }
    }

    fn bind(&self) -> std::io::Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        set_rendezvous_permissions(&self.socket_path)?;
        Ok(listener)
    }

    async fn accept_and_decode(
        &self,
        listener: &UnixListener,
    ) -> Result<StateContext, EngineError> {
        let (mut stream, _addr) = listener.accept().await.map_err(EngineError::Io)?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.map_err(EngineError::Io)?;
        serde_json::from_slice(&buf).map_err(|e| {
            EngineError::StateLoadFailed(self.socket_path.clone(), e.to_string())
        })
    }
}

#[cfg(unix)]
fn set_rendezvous_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}


#[cfg(test)]
mod tests {
    use super::*;
    use aeterna_core::context::Value;

    fn temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aeterna-test.sock");
        std::mem::forget(dir);
        path
    }

    #[tokio::test]
    async fn receives_one_frame_and_removes_the_socket_file() {
        let path = temp_socket_path();
        let relay = StateRelay::new(path.clone());

        let mut state = StateContext::new();
        state.insert("connections".to_string(), Value::Int(42));
        state.insert("version".to_string(), Value::Str("1.2.3".to_string()));

        let sender_state = state.clone();
        let sender_path = path.clone();
        let sender = tokio::spawn(async move {
            // give the receiver a moment to bind before dialing
            tokio::time::sleep(Duration::from_millis(50)).await;
            test_support::send_state(&sender_path, &sender_state).await.unwrap();
        });

        let received = relay.wait_state_transfer(Duration::from_secs(2)).await.unwrap();
        sender.await.unwrap();

        assert_eq!(received, state);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn no_connection_times_out_and_cleans_up() {
        let path = temp_socket_path();
        let relay = StateRelay::new(path.clone());
        let err = relay.wait_state_transfer(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, EngineError::StateDumpTimeout(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_as_state_load_failed() {
        let path = temp_socket_path();
        let relay = StateRelay::new(path.clone());

        let sender_path = path.clone();
        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut stream = tokio::net::UnixStream::connect(&sender_path).await.unwrap();
            use tokio::io::AsyncWriteExt;
            stream.write_all(b"not json").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let err = relay.wait_state_transfer(Duration::from_secs(2)).await.unwrap_err();
        sender.await.unwrap();
        assert!(matches!(err, EngineError::StateLoadFailed(_, _)));
    }
}
