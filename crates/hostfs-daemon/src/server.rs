// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Unix-socket transport
//!
//! One JSON object per line in both directions. Each connection gets a
//! reader task and a writer task; the writer drains an unbounded channel so
//! delivering a change event never blocks the watch hub's event loop. When
//! the reader sees EOF or an error the connection's disconnect hooks run,
//! tearing down every subscription the client still holds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::{wrappers::UnixListenerStream, StreamExt};
use tracing::{debug, error, info, warn};

use hostfs_proto::{
    CallbackFrame, CallbackRef, ClientFrame, ResponseEnvelope, ServerFrame, WireError,
};

use crate::operations::Dispatcher;
use crate::transport::{ClientLink, RemoteCallback, RequestContext};

pub struct DaemonServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    dispatcher: Arc<Dispatcher>,
}

impl DaemonServer {
    pub fn new(socket_path: PathBuf, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Remove a stale socket from a previous run
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;

        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&socket_path)?.permissions();
            perms.set_mode(0o666);
            std::fs::set_permissions(&socket_path, perms)?;
        }

        info!(socket_path = %socket_path.display(), "daemon listening on socket");

        Ok(Self {
            socket_path,
            listener: Some(listener),
            dispatcher,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let listener = self.listener.take().ok_or_else(|| anyhow!("server not initialized"))?;
        let mut stream = UnixListenerStream::new(listener);

        while let Some(connection) = stream.next().await {
            match connection {
                Ok(socket) => {
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(dispatcher, socket).await {
                            error!(error = %err, "error handling client");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "error accepting connection");
                }
            }
        }

        Ok(())
    }

    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down daemon");
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        Ok(())
    }
}

/// Per-connection state shared between the reader, the writer and any
/// handler that minted callbacks or registered disconnect hooks.
struct ClientConnection {
    outbound: UnboundedSender<ServerFrame>,
    server_callbacks: Mutex<HashMap<u64, Arc<dyn Fn() + Send + Sync>>>,
    next_callback_id: AtomicU64,
    disconnect_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ClientConnection {
    fn new(outbound: UnboundedSender<ServerFrame>) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            server_callbacks: Mutex::new(HashMap::new()),
            next_callback_id: AtomicU64::new(1),
            disconnect_hooks: Mutex::new(Vec::new()),
        })
    }

    fn invoke_server_callback(&self, id: u64) {
        let callback = self.server_callbacks.lock().unwrap().get(&id).cloned();
        match callback {
            Some(callback) => callback(),
            None => debug!(id, "invoke for unknown callback"),
        }
    }

    fn run_disconnect_hooks(&self) {
        let hooks: Vec<_> = self.disconnect_hooks.lock().unwrap().drain(..).collect();
        for hook in hooks {
            hook();
        }
    }
}

impl ClientLink for ClientConnection {
    fn on_disconnect(&self, hook: Box<dyn FnOnce() + Send>) {
        self.disconnect_hooks.lock().unwrap().push(hook);
    }
}

/// Remote callback handle bound to one client-registered callback id.
struct ConnectionCallback {
    outbound: UnboundedSender<ServerFrame>,
    id: u64,
}

impl RemoteCallback for ConnectionCallback {
    fn call(&self, value: Value) {
        // fire-and-forget; a closed connection just drops the event
        let _ = self.outbound.send(ServerFrame::Callback(CallbackFrame {
            callback: self.id,
            args: vec![value],
        }));
    }
}

struct ConnectionRequestContext {
    username: String,
    connection: Arc<ClientConnection>,
}

impl RequestContext for ConnectionRequestContext {
    fn username(&self) -> &str {
        &self.username
    }

    fn remote_callback(&self, reference: CallbackRef) -> Arc<dyn RemoteCallback> {
        Arc::new(ConnectionCallback {
            outbound: self.connection.outbound.clone(),
            id: reference.id,
        })
    }

    fn register_callback(&self, hook: Box<dyn Fn() + Send + Sync>) -> CallbackRef {
        let id = self.connection.next_callback_id.fetch_add(1, Ordering::SeqCst);
        self.connection.server_callbacks.lock().unwrap().insert(id, Arc::from(hook));
        CallbackRef { id }
    }

    fn client(&self) -> Arc<dyn ClientLink> {
        self.connection.clone()
    }
}

async fn handle_client(dispatcher: Arc<Dispatcher>, socket: UnixStream) -> Result<()> {
    let (read_half, write_half) = socket.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = ClientConnection::new(outbound_tx);
    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    let result = read_loop(&dispatcher, &connection, read_half).await;

    // EOF and read errors both mean the client is gone
    connection.run_disconnect_hooks();
    writer.abort();
    result
}

async fn read_loop(
    dispatcher: &Arc<Dispatcher>,
    connection: &Arc<ClientConnection>,
    read_half: OwnedReadHalf,
) -> Result<()> {
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<ClientFrame>(trimmed) {
            Ok(ClientFrame::Request(envelope)) => {
                let dispatcher = dispatcher.clone();
                let connection = connection.clone();
                // Blocking filesystem work runs off the reactor, so requests
                // from one client can execute concurrently.
                tokio::task::spawn_blocking(move || {
                    let ctx = ConnectionRequestContext {
                        username: envelope.username.clone(),
                        connection: connection.clone(),
                    };
                    let response = match dispatcher.process_request(&envelope, &ctx) {
                        Ok(result) => ResponseEnvelope {
                            id: envelope.id,
                            result: Some(result),
                            error: None,
                        },
                        Err(err) => ResponseEnvelope {
                            id: envelope.id,
                            result: None,
                            error: Some(WireError {
                                message: err.to_string(),
                            }),
                        },
                    };
                    let _ = connection.outbound.send(ServerFrame::Response(response));
                });
            }
            Ok(ClientFrame::Invoke(frame)) => {
                connection.invoke_server_callback(frame.invoke);
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
            }
        }
    }

    Ok(())
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut outbound: UnboundedReceiver<ServerFrame>) {
    while let Some(frame) = outbound.recv().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode frame");
                continue;
            }
        };
        line.push('\n');

        if write_half.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}
