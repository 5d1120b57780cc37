//! The server loop: one listener, at most one client.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use super::wake::WakeSource;
use super::{ConnectionState, Shared, debug_callback};
use crate::debugger::Debuggee;

pub(crate) struct ServerLoop {
    pub(crate) listener: TcpListener,
    pub(crate) engine: Arc<dyn Debuggee>,
    pub(crate) shared: Arc<Shared>,
    /// Signalled after every forwarded command.
    pub(crate) process: WakeSource,
    pub(crate) stop: WakeSource,
    pub(crate) read_buffer_size: usize,
}

/// The connected client. Writes happen on a separate task so that a client
/// that stops reading never holds up the loop.
struct Client {
    reader: OwnedReadHalf,
    writer: JoinHandle<()>,
}

impl Drop for Client {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

impl ServerLoop {
    /// Serves on the calling thread until the stop source is signalled.
    pub(crate) fn run(self, runtime: &Runtime) {
        log::debug!("server loop started");
        runtime.block_on(self.serve());
        log::debug!("server loop stopped");
    }

    async fn serve(self) {
        let mut client: Option<Client> = None;
        let mut buffer = vec![0u8; self.read_buffer_size.max(1)];

        loop {
            tokio::select! {
                biased;
                () = self.stop.wait() => break,
                read = read_client(client.as_mut(), &mut buffer) => match read {
                    Ok(0) => {
                        log::info!("debugger client disconnected");
                        self.disconnect(&mut client);
                    }
                    Ok(len) => self.forward(&buffer[..len]),
                    Err(err) => {
                        log::warn!("debugger client read failed: {err}");
                        self.disconnect(&mut client);
                    }
                },
                accepted = self.listener.accept() => self.accept(accepted, &mut client),
            }
        }

        drop(client);
        drop(self.listener);
        self.shared.set_connection(ConnectionState::Offline);
    }

    fn accept(&self, accepted: io::Result<(TcpStream, SocketAddr)>, client: &mut Option<Client>) {
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("failed to accept debugger client: {err}");
                return;
            }
        };

        if client.is_some() {
            log::warn!("closing connection from {peer}: a debugger client is already connected");
            return;
        }

        if let Err(err) = stream.set_nodelay(true) {
            log::warn!("failed to set TCP_NODELAY for {peer}: {err}");
        }
        let stale = self.shared.queue.clear();
        if stale > 0 {
            log::debug!("discarded {stale} debug messages queued without a client");
        }

        let (reader, writer) = stream.into_split();
        *client = Some(Client {
            reader,
            writer: tokio::spawn(write_loop(writer, self.shared.clone())),
        });
        self.shared.set_connection(ConnectionState::Connected);
        log::info!("debugger client connected from {peer}");
    }

    fn forward(&self, command: &[u8]) {
        log::trace!("forwarding {} command bytes", command.len());
        if let Err(err) = self.engine.send_debug_command(command) {
            log::warn!("engine rejected debug command: {err}");
            return;
        }
        self.process.signal();
    }

    fn disconnect(&self, client: &mut Option<Client>) {
        *client = None;
        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            log::debug!("discarded {dropped} undelivered debug messages");
        }

        // A fresh session drops the engine's buffered commands and partial
        // input, and withholds late output, of the client that just left.
        self.engine.detach_debug_callback();
        if let Err(err) = self
            .engine
            .attach_debug_callback(debug_callback(Arc::downgrade(&self.shared)))
        {
            log::error!("failed to re-attach to the engine after disconnect: {err}");
        }

        self.shared.set_connection(ConnectionState::Listening);
    }
}

/// Reads from the client, or never completes while there is none.
async fn read_client(client: Option<&mut Client>, buffer: &mut [u8]) -> io::Result<usize> {
    match client {
        Some(client) => client.reader.read(buffer).await,
        None => std::future::pending().await,
    }
}

/// Drains the queue into `writer` every time the send source fires, until
/// aborted.
async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, shared: Arc<Shared>) {
    loop {
        shared.send.wait().await;
        write_messages(&mut writer, shared.queue.take_all()).await;
    }
}

/// Writes every message in order. A failed write is logged and the rest are
/// still attempted; returns the number of failures.
async fn write_messages<W: AsyncWrite + Unpin>(writer: &mut W, messages: VecDeque<String>) -> usize {
    let mut failed = 0;
    for message in messages {
        log::trace!("writing {} byte debug message", message.len());
        if let Err(err) = writer.write_all(message.as_bytes()).await {
            log::warn!("failed to write debug message: {err}");
            failed += 1;
        }
    }
    failed
}
