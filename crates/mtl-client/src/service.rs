use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use socket2::{Domain, Socket, Type};

use crate::error::ClientError;
use crate::pacing::AdaptivePacer;
use crate::queue::SendQueue;
use crate::receiver::{self, OnMessage};
use crate::sender;
use crate::stop::Stopped;

/// Client total pending bound (out_queue + nacked_queue), original spec §6.
pub const MAX_OUT_BUFFER: usize = 128;

/// One TCP connection to a broker with its Sender and Receiver tasks.
///
/// Mirrors the original `create`/`connect`/`start`/`set_incoming_listener`/
/// `schedule`/`stop`/`destroy` lifecycle as an idiomatic Rust API:
/// [`Service::connect`] both creates and connects, [`Service::start`] takes
/// the incoming-message listener directly, and `destroy` is `Drop`.
pub struct Service {
    queue: Arc<SendQueue>,
    pacer: Arc<AdaptivePacer>,
    stop: Stopped,
    local_addr: SocketAddrV4,
    shutdown_stream: TcpStream,
    write_stream: Option<TcpStream>,
    read_stream: Option<TcpStream>,
    sender_handle: Option<JoinHandle<()>>,
    receiver_handle: Option<JoinHandle<()>>,
}

impl Service {
    /// Binds `local_port` (0 lets the kernel assign an ephemeral port) and
    /// connects to `server_addr`. The broker identifies this client as a
    /// message destination by this local `(addr, port)` — call
    /// [`Service::local_addr`] to learn the actual bound port.
    pub fn connect(server_addr: SocketAddrV4, local_port: u16) -> Result<Self, ClientError> {
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port));
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(ClientError::Connect)?;
        socket.bind(&local.into()).map_err(ClientError::Connect)?;
        socket.connect(&SocketAddr::V4(server_addr).into()).map_err(ClientError::Connect)?;
        let stream: TcpStream = socket.into();
        let write_stream = stream.try_clone().map_err(ClientError::Connect)?;
        let shutdown_stream = stream.try_clone().map_err(ClientError::Connect)?;
        let local_addr = match stream.local_addr().map_err(ClientError::Connect)? {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => {
                return Err(ClientError::Connect(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "only IPv4 is supported",
                )));
            }
        };

        Ok(Self {
            queue: Arc::new(SendQueue::new(MAX_OUT_BUFFER)),
            pacer: Arc::new(AdaptivePacer::new()),
            stop: Stopped::new(),
            local_addr,
            shutdown_stream,
            write_stream: Some(write_stream),
            read_stream: Some(stream),
            sender_handle: None,
            receiver_handle: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// Frames submitted to the broker so far, NACKed or not.
    pub fn sent_count(&self) -> u64 {
        self.pacer.sent_count()
    }

    /// Submitted frames that have come back NACKed at least once.
    pub fn nacked_count(&self) -> u64 {
        self.pacer.nacked_count()
    }

    /// Spawns the Sender and Receiver tasks. `on_message` is invoked from
    /// the Receiver thread for every normally-delivered frame with the
    /// original source address. May only be called once per `Service`.
    pub fn start(
        &mut self,
        on_message: impl Fn(SocketAddrV4, &[u8]) + Send + Sync + 'static,
    ) -> Result<(), ClientError> {
        let write_stream = self.write_stream.take().ok_or(ClientError::Stopped)?;
        let read_stream = self.read_stream.take().ok_or(ClientError::Stopped)?;
        let on_message: Arc<OnMessage> = Arc::new(on_message);

        let queue = Arc::clone(&self.queue);
        let pacer = Arc::clone(&self.pacer);
        let stop = self.stop.clone();
        self.sender_handle = Some(thread::spawn(move || sender::run(write_stream, &queue, &pacer, &stop)));

        let queue = Arc::clone(&self.queue);
        let pacer = Arc::clone(&self.pacer);
        self.receiver_handle =
            Some(thread::spawn(move || receiver::run(read_stream, &queue, &pacer, &on_message)));

        Ok(())
    }

    /// Submits `payload` for delivery to `(dest_addr, dest_port)`, assigning
    /// the next sequence number and blocking if the combined out/nacked
    /// backlog is at [`MAX_OUT_BUFFER`].
    pub fn schedule(&self, dest_addr: Ipv4Addr, dest_port: u16, payload: &[u8]) -> Result<(), ClientError> {
        self.queue.schedule(dest_addr, dest_port, payload, &self.stop)
    }

    /// Flushes pending sends, then stops the Sender and Receiver tasks and
    /// waits for them to exit. Per original spec §5, the queues are drained
    /// (and double-checked against a late-arriving NACK) before the stop
    /// flag is set and the socket is closed, so nothing still in
    /// `out_queue`/`nacked_queue` is silently discarded. Idempotent: calling
    /// this more than once (including via `Drop`) is a no-op after the
    /// first call.
    pub fn stop(&mut self) {
        if self.sender_handle.is_some() {
            self.queue.wait_drained();
        }

        self.stop.trigger();
        self.queue.wake_all();
        let _ = self.shutdown_stream.shutdown(Shutdown::Both);
        if let Some(h) = self.sender_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.receiver_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}
