//! TCP adapter
//!
//! Connects roles across processes. Every connection carries length-prefixed
//! frames (see [`frame`]), one invoke per frame. The first frame a slave sends
//! is a `_hello` invoke carrying its name; after that both directions carry
//! ordinary envelopes.
//!
//! ```text
//! Master (MasterServer)              Slave (SlaveConnection)
//!     |                                  |
//!     |<------- _hello(name) ------------|
//!     |                                  |
//!     |-- job invoke + segment params -->|
//!     |<------ _report_segment ----------|
//!     |                                  |
//!     |<----------- EOF -----------------|   system removed, work redistributed
//! ```
//!
//! Inbound frames are delivered on the blocking pool, one at a time per
//! connection, so a role may block while it handles a message without stalling
//! the runtime. Outbound frames are queued to a writer task per connection.

pub mod frame;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::parallel::{Mediator, ParallelSystemArray, PieceWorker, SystemId};
use crate::protocol::{deliver, wire, Invoke, Protocol, Transport};
use crate::slave::{SegmentWorker, SlaveSystem};
use crate::sync::CriticalMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Listener of the first frame a slave sends
pub const HELLO: &str = "_hello";

// === Transport ===

/// Sending half of one TCP connection
///
/// Frames are queued without blocking and written by a dedicated task.
#[derive(Debug)]
pub struct TcpTransport {
    peer: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl TcpTransport {
    /// Start the writer task on the current runtime
    pub fn spawn(mut writer: OwnedWriteHalf, peer: String) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, mut queue) = mpsc::unbounded_channel::<Vec<u8>>();
        let label = peer.clone();

        let task = tokio::spawn(async move {
            while let Some(payload) = queue.recv().await {
                if let Err(e) = frame::write_frame(&mut writer, &payload).await {
                    warn!(peer = %label, error = %e, "Failed to write frame");
                    break;
                }
            }
            writer.shutdown().await.ok();
            debug!(peer = %label, "Writer stopped");
        });

        let transport = Arc::new(Self {
            peer,
            sender: Mutex::new(Some(sender)),
        });
        (transport, task)
    }
}

impl Transport for TcpTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender
                .send(bytes.to_vec())
                .map_err(|_| Error::Disconnected(self.peer.clone())),
            None => Err(Error::Disconnected(self.peer.clone())),
        }
    }

    fn close(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

fn joined(e: JoinError) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Deliver every inbound frame to `role` until the peer closes
///
/// Failures are logged and the loop continues; a message the role rejects is
/// a warning, anything else an error. Ends early if `role` is dropped.
pub async fn pump<R>(mut reader: R, role: Weak<dyn Protocol>, max_frame_bytes: usize, peer: &str) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    while let Some(payload) = frame::read_frame(&mut reader, max_frame_bytes).await? {
        let target = role.clone();
        let delivered = tokio::task::spawn_blocking(move || {
            target.upgrade().map(|target| deliver(&*target, &payload))
        })
        .await
        .map_err(joined)?;

        match delivered {
            None => break,
            Some(Ok(())) => {}
            Some(Err(e)) if e.is_per_message() => warn!(peer, error = %e, "Rejected message"),
            Some(Err(e)) => error!(peer, error = %e, "Failed to handle message"),
        }
    }

    debug!(peer, "Connection closed");
    Ok(())
}

// === Master ===

/// Accepts slaves into a [`ParallelSystemArray`]
///
/// Each connection becomes one member for as long as it stays open.
pub struct MasterServer {
    listener: TcpListener,
    array: Arc<ParallelSystemArray>,
    config: NetworkConfig,
    sessions: Arc<CriticalMap<SocketAddr, SystemId>>,
}

impl MasterServer {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        array: Arc<ParallelSystemArray>,
        config: NetworkConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Master listening");
        Ok(Self {
            listener,
            array,
            config,
            sessions: Arc::new(CriticalMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn array(&self) -> &Arc<ParallelSystemArray> {
        &self.array
    }

    /// Open connections and the member each one became
    pub fn sessions(&self) -> Arc<CriticalMap<SocketAddr, SystemId>> {
        Arc::clone(&self.sessions)
    }

    /// Accept slaves until the listener fails
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!(peer = %addr, "Slave connected");

            let array = Arc::clone(&self.array);
            let config = self.config.clone();
            let sessions = Arc::clone(&self.sessions);
            tokio::spawn(async move {
                if let Err(e) = serve(stream, addr, array, config, sessions).await {
                    warn!(peer = %addr, error = %e, "Session ended with error");
                }
            });
        }
    }

    /// Run the accept loop on its own task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    array: Arc<ParallelSystemArray>,
    config: NetworkConfig,
    sessions: Arc<CriticalMap<SocketAddr, SystemId>>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();
    let peer = addr.to_string();

    let Some(first) = frame::read_frame(&mut reader, config.max_frame_bytes).await? else {
        debug!(peer = %peer, "Slave left before introducing itself");
        return Ok(());
    };
    let hello = wire::decode_invoke(&first)?;
    if hello.listener() != HELLO {
        return Err(Error::structural(format!(
            "expected '{}' as first message, got '{}'",
            HELLO,
            hello.listener()
        )));
    }
    let name = hello.value(0)?.as_str()?.to_string();

    let (transport, writer_task) = TcpTransport::spawn(writer, peer.clone());
    let system = {
        let array = Arc::clone(&array);
        let transport: Arc<dyn Transport> = transport.clone();
        let pending = config.handshake_on_connect;
        tokio::task::spawn_blocking(move || {
            if pending {
                array.add_pending_system(name, transport)
            } else {
                array.add_system(name, transport)
            }
        })
        .await
        .map_err(joined)?
    };
    let id = system.id();
    sessions.insert(addr, id);

    let role = Arc::downgrade(&system);
    let role: Weak<dyn Protocol> = role;
    drop(system);
    let result = pump(reader, role, config.max_frame_bytes, &peer).await;

    sessions.remove(&addr);
    tokio::task::spawn_blocking(move || array.remove_system(id))
        .await
        .map_err(joined)?;
    transport.close();
    writer_task.await.map_err(joined)?;

    info!(peer = %peer, system = id, "Slave disconnected");
    result
}

// === Slave ===

/// A worker's connection to its master
pub struct SlaveConnection {
    slave: Arc<SlaveSystem>,
    reader: JoinHandle<Result<()>>,
    writer: JoinHandle<()>,
}

impl SlaveConnection {
    /// Connect, introduce ourselves as `name`, and start serving segments
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: impl Into<String>,
        worker: impl SegmentWorker + 'static,
        config: &NetworkConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?.to_string();
        let (reader, writer) = stream.into_split();

        let (transport, writer) = TcpTransport::spawn(writer, peer.clone());
        let name = name.into();
        transport.send(&wire::encode_invoke(&Invoke::new(HELLO).with(name.as_str()))?)?;
        info!(master = %peer, name = %name, "Connected to master");

        let slave = Arc::new(SlaveSystem::new(name, transport, worker));
        let role = Arc::downgrade(&slave);
        let role: Weak<dyn Protocol> = role;
        let max_frame_bytes = config.max_frame_bytes;
        let reader = tokio::spawn(async move { pump(reader, role, max_frame_bytes, &peer).await });

        Ok(Self { slave, reader, writer })
    }

    /// Connect `array` upstream as a single worker named `name`
    ///
    /// Segments from the master are re-split over the array's members. Keep
    /// the returned [`Mediator`] alive for as long as the connection relays.
    pub async fn connect_mediator(
        addr: impl ToSocketAddrs,
        name: impl Into<String>,
        array: Arc<ParallelSystemArray>,
        config: &NetworkConfig,
    ) -> Result<(Self, Mediator)> {
        let connection = Self::connect(addr, name, PieceWorker::new(Arc::clone(&array)), config).await?;
        let mediator = Mediator::new(array, Arc::clone(&connection.slave));
        Ok((connection, mediator))
    }

    pub fn slave(&self) -> &Arc<SlaveSystem> {
        &self.slave
    }

    /// Start closing; the master observes the disconnect
    pub fn close(&self) {
        self.slave.base().close();
    }

    /// Wait until the master closes the connection
    pub async fn closed(self) -> Result<()> {
        let result = self.reader.await.map_err(joined)?;
        self.slave.base().close();
        self.writer.await.map_err(joined)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_refuses_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let (_, writer) = client.into_split();
        let (transport, task) = TcpTransport::spawn(writer, addr.to_string());
        transport.send(b"<invoke listener=\"ping\"/>").unwrap();
        assert_eq!(
            frame::read_frame(&mut server, 1024).await.unwrap().unwrap(),
            b"<invoke listener=\"ping\"/>"
        );

        transport.close();
        assert!(matches!(transport.send(b"late"), Err(Error::Disconnected(_))));
        task.await.unwrap();
        assert!(frame::read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Protocol for Capture {
        fn send_data(&self, _invoke: Arc<Invoke>) -> Result<()> {
            Ok(())
        }

        fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
            if invoke.listener() == "refuse" {
                return Err(Error::Disconnected("downstream".into()));
            }
            self.0.lock().unwrap().push(invoke.listener().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pump_survives_failed_messages() {
        let (mut client, server) = tokio::io::duplex(1024);
        frame::write_frame(&mut client, b"not markup").await.unwrap();
        frame::write_frame(&mut client, b"<invoke listener=\"refuse\"/>").await.unwrap();
        frame::write_frame(&mut client, b"<invoke listener=\"ping\"/>").await.unwrap();
        drop(client);

        let capture = Arc::new(Capture::default());
        let role = Arc::downgrade(&capture);
        let role: Weak<dyn Protocol> = role;
        pump(server, role, 1024, "test").await.unwrap();
        assert_eq!(*capture.0.lock().unwrap(), vec!["ping".to_string()]);
    }
}
