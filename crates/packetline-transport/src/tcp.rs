use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::event::{ChannelEvent, EventBus, NetworkErrorCode, UserData};
use crate::traits::{ChannelId, NetworkChannel};

/// Blocking TCP implementation of [`NetworkChannel`].
///
/// The channel is created unconnected so that socket options can be recorded
/// before [`connect`](TcpChannel::connect). Buffer sizes recorded up front are
/// applied to the socket as soon as the TCP handshake completes.
///
/// Lifecycle events are published on the attached [`EventBus`], if any:
/// `Connected` after a successful connect, `TransportError` when connecting or
/// sending fails, and `Closed` exactly once when the channel closes.
///
/// Writes go through a shared handle taken out of the lock, so [`close`]
/// can shut the socket down while a send is blocked on a full buffer.
///
/// [`close`]: NetworkChannel::close
pub struct TcpChannel {
    id: ChannelId,
    name: String,
    bus: Option<Arc<EventBus>>,
    stream: Mutex<Option<Arc<TcpStream>>>,
    buffer_sizes: Mutex<Option<(usize, usize)>>,
    closed: AtomicBool,
}

impl TcpChannel {
    /// Create an unconnected channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ChannelId::next(),
            name: name.into(),
            bus: None,
            stream: Mutex::new(None),
            buffer_sizes: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Publish lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Connect to `addr` (blocking).
    pub fn connect(&self, addr: SocketAddr, user_data: Option<UserData>) -> Result<()> {
        self.connect_with_timeout(addr, None, user_data)
    }

    /// Connect to `addr`, giving up after `timeout` when one is set.
    pub fn connect_with_timeout(
        &self,
        addr: SocketAddr,
        timeout: Option<Duration>,
        user_data: Option<UserData>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.name.clone()));
        }
        if self.lock_stream().is_some() {
            return Err(TransportError::AlreadyConnected(self.name.clone()));
        }

        let connected = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(source) => {
                self.publish_error(NetworkErrorCode::Connect, &source);
                return Err(TransportError::Connect { addr, source });
            }
        };

        if let Err(err) = self.configure(&stream) {
            let _ = stream.shutdown(Shutdown::Both);
            if let TransportError::Io(io) = &err {
                self.publish_error(NetworkErrorCode::Socket, io);
            }
            return Err(err);
        }

        self.install(stream)?;
        info!(channel = %self.name, %addr, "tcp channel connected");
        self.publish(ChannelEvent::Connected { user_data });
        Ok(())
    }

    // `close` flips the flag before taking the lock, so checking it under the
    // lock catches a close that landed during the handshake.
    fn install(&self, stream: TcpStream) -> Result<()> {
        let mut slot = self.lock_stream();
        if self.is_closed() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(TransportError::Closed(self.name.clone()));
        }
        if slot.is_some() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(TransportError::AlreadyConnected(self.name.clone()));
        }
        *slot = Some(Arc::new(stream));
        Ok(())
    }

    /// Clone the socket for a receive context.
    pub fn reader(&self) -> Result<TcpStream> {
        match self.lock_stream().as_ref() {
            Some(stream) => Ok(stream.try_clone()?),
            None if self.is_closed() => Err(TransportError::Closed(self.name.clone())),
            None => Err(TransportError::NotConnected(self.name.clone())),
        }
    }

    /// Socket receive/send buffer sizes as reported by the kernel.
    #[cfg(unix)]
    pub fn socket_buffer_sizes(&self) -> Option<(usize, usize)> {
        use std::os::fd::AsRawFd;

        let guard = self.lock_stream();
        let fd = guard.as_ref()?.as_raw_fd();
        let receive = get_socket_option(fd, libc::SO_RCVBUF)?;
        let send = get_socket_option(fd, libc::SO_SNDBUF)?;
        Some((receive, send))
    }

    fn configure(&self, stream: &TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;
        let pending = *self
            .buffer_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((receive, send)) = pending {
            apply_buffer_sizes(stream, receive, send)?;
        }
        Ok(())
    }

    fn publish(&self, event: ChannelEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(self, &event);
        }
    }

    fn publish_error(&self, code: NetworkErrorCode, err: &std::io::Error) {
        warn!(channel = %self.name, %code, error = %err, "tcp channel error");
        self.publish(ChannelEvent::TransportError {
            code,
            socket_error: Some(err.kind()),
            message: err.to_string(),
        });
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Arc<TcpStream>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NetworkChannel for TcpChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_stream().as_ref()?.local_addr().ok()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock_stream().as_ref()?.peer_addr().ok()
    }

    fn send_bytes(&self, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.name.clone()));
        }

        // Never write under the lock: close() must reach the socket.
        let Some(stream) = self.lock_stream().clone() else {
            return Err(TransportError::NotConnected(self.name.clone()));
        };

        match write_all(&stream, frame) {
            Ok(()) => {
                debug!(channel = %self.name, bytes = frame.len(), "frame sent");
                Ok(())
            }
            Err(err) if self.is_closed() => {
                debug!(channel = %self.name, error = %err, "send aborted by close");
                Err(TransportError::Closed(self.name.clone()))
            }
            Err(err) => {
                self.publish_error(NetworkErrorCode::Send, &err);
                Err(TransportError::Io(err))
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(stream) = self.lock_stream().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        info!(channel = %self.name, "tcp channel closed");
        self.publish(ChannelEvent::Closed);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_buffer_sizes(&self, receive: usize, send: usize) -> Result<()> {
        *self
            .buffer_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((receive, send));

        match self.lock_stream().as_ref() {
            Some(stream) => apply_buffer_sizes(stream, receive, send),
            None => {
                debug!(channel = %self.name, receive, send, "buffer sizes recorded for connect");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn write_all(mut stream: &TcpStream, mut buf: &[u8]) -> std::io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => buf = &buf[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    stream.flush()
}

#[cfg(unix)]
fn apply_buffer_sizes(stream: &TcpStream, receive: usize, send: usize) -> Result<()> {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    set_socket_option(fd, libc::SO_RCVBUF, receive)?;
    set_socket_option(fd, libc::SO_SNDBUF, send)?;
    debug!(receive, send, "socket buffer sizes applied");
    Ok(())
}

#[cfg(not(unix))]
fn apply_buffer_sizes(_stream: &TcpStream, receive: usize, send: usize) -> Result<()> {
    debug!(receive, send, "socket buffer sizing not supported on this platform");
    Ok(())
}

#[cfg(unix)]
fn set_socket_option(fd: libc::c_int, option: libc::c_int, value: usize) -> Result<()> {
    let value = libc::c_int::try_from(value).unwrap_or(libc::c_int::MAX);

    // SAFETY: `value` outlives the call and the length matches its type;
    // `fd` is an open socket owned by the caller's `TcpStream`.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::Io(std::io::Error::last_os_error()))
    }
}

#[cfg(unix)]
fn get_socket_option(fd: libc::c_int, option: libc::c_int) -> Option<usize> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `value` and `len` are valid writable pointers for the provided sizes,
    // and `fd` is an open socket owned by the caller's `TcpStream`.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if rc == 0 {
        usize::try_from(value).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::event::EventKind;

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn counting(bus: &EventBus, kind: EventKind) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(kind, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn connect_send_and_receive() {
        let (listener, addr) = listener();
        let bus = Arc::new(EventBus::new());
        let connected = counting(&bus, EventKind::Connected);

        let channel = TcpChannel::new("game").with_event_bus(Arc::clone(&bus));
        channel.connect(addr, None).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        channel.send_bytes(b"hello").unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();

        assert_eq!(&buf, b"hello");
        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(channel.peer_addr(), Some(addr));
        assert!(channel.local_addr().is_some());
    }

    #[test]
    fn close_is_idempotent_and_publishes_once() {
        let (listener, addr) = listener();
        let bus = Arc::new(EventBus::new());
        let closed = counting(&bus, EventKind::Closed);

        let channel = TcpChannel::new("game").with_event_bus(Arc::clone(&bus));
        channel.connect(addr, None).unwrap();
        let _server = listener.accept().unwrap();

        channel.close();
        channel.close();

        assert!(channel.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_after_close_fails() {
        let (listener, addr) = listener();
        let channel = TcpChannel::new("game");
        channel.connect(addr, None).unwrap();
        let _server = listener.accept().unwrap();

        channel.close();
        let err = channel.send_bytes(b"late").unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
        assert!(matches!(channel.reader(), Err(TransportError::Closed(_))));
    }

    #[test]
    fn close_aborts_a_blocked_send() {
        let (listener, addr) = listener();
        let bus = Arc::new(EventBus::new());
        let errors = counting(&bus, EventKind::TransportError);
        let channel = Arc::new(TcpChannel::new("stalled").with_event_bus(Arc::clone(&bus)));
        channel.connect(addr, None).unwrap();
        // Accepted but never read, so the send fills both socket buffers.
        let _server = listener.accept().unwrap();

        let sender = Arc::clone(&channel);
        let (done_tx, done_rx) = mpsc::channel();
        let writer = thread::spawn(move || {
            let result = sender.send_bytes(&vec![0u8; 64 * 1024 * 1024]);
            let _ = done_tx.send(());
            result
        });
        thread::sleep(Duration::from_millis(300));

        let (closed_tx, closed_rx) = mpsc::channel();
        let closer = Arc::clone(&channel);
        thread::spawn(move || {
            closer.close();
            let _ = closed_tx.send(());
        });

        closed_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("close blocked behind the writer");
        done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("send not aborted by close");
        let result = writer.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed(_))));
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(matches!(channel.reader(), Err(TransportError::Closed(_))));
    }

    #[test]
    fn close_during_handshake_drops_the_new_socket() {
        let (listener, addr) = listener();
        let channel = TcpChannel::new("racing");

        // Handshake done, close lands before the socket is stored.
        let stream = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        channel.close();

        let err = channel.install(stream).unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
        assert!(matches!(channel.reader(), Err(TransportError::Closed(_))));
        assert!(channel.peer_addr().is_none());

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn send_before_connect_fails() {
        let channel = TcpChannel::new("idle");
        let err = channel.send_bytes(b"x").unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }

    #[test]
    fn double_connect_rejected() {
        let (listener, addr) = listener();
        let channel = TcpChannel::new("game");
        channel.connect(addr, None).unwrap();
        let _server = listener.accept().unwrap();

        let err = channel.connect(addr, None).unwrap_err();
        assert!(matches!(err, TransportError::AlreadyConnected(_)));
    }

    #[test]
    fn connect_failure_publishes_transport_error() {
        let (listener, addr) = listener();
        drop(listener);

        let bus = Arc::new(EventBus::new());
        let errors = counting(&bus, EventKind::TransportError);
        let channel = TcpChannel::new("refused").with_event_bus(Arc::clone(&bus));

        let err = channel.connect(addr, None).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reader_clone_receives_server_bytes() {
        let (listener, addr) = listener();
        let channel = TcpChannel::new("game");
        channel.connect(addr, None).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut reader = channel.reader().unwrap();
        server.write_all(b"pong").unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    #[cfg(unix)]
    fn buffer_sizes_recorded_before_connect_are_applied() {
        let (listener, addr) = listener();
        let channel = TcpChannel::new("game");
        channel.set_buffer_sizes(64 * 1024, 64 * 1024).unwrap();
        channel.connect(addr, None).unwrap();
        let _server = listener.accept().unwrap();

        let (receive, send) = channel.socket_buffer_sizes().unwrap();
        assert!(receive >= 64 * 1024);
        assert!(send >= 64 * 1024);
    }
}
