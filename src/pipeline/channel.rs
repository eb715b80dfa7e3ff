//! Persistent socket plus fixed-cadence loop shared by the image and command channels.
//!
//! Each channel runs on its own thread: `Connecting` → `Streaming` → `Disconnected`.
//! A failed cycle is logged and skipped; a closed connection ends the loop, and the
//! channel stays `Disconnected` until it is started again.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

/// Granularity at which a sleeping loop re-checks its running flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not resolve {addr}")]
    Resolve { addr: String },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection closed by peer")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// Whether the connection is gone, as opposed to a single failed cycle.
    pub fn is_closed(&self) -> bool {
        match self {
            ChannelError::Closed => true,
            ChannelError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            ),
            ChannelError::Resolve { .. } | ChannelError::Connect { .. } => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Streaming,
}

impl ChannelState {
    fn as_u8(self) -> u8 {
        match self {
            ChannelState::Disconnected => 0,
            ChannelState::Connecting => 1,
            ChannelState::Streaming => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelState::Connecting,
            2 => ChannelState::Streaming,
            _ => ChannelState::Disconnected,
        }
    }
}

/// Where a channel connects and how often it cycles.
#[derive(Clone, Debug)]
pub struct ChannelSettings {
    pub name: &'static str,
    pub addr: String,
    pub interval: Duration,
    pub connect_timeout: Duration,
}

/// One socket, used by exactly one channel loop and never reused after teardown.
#[derive(Debug)]
pub struct ChannelConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ChannelConnection {
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, ChannelError> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|_| ChannelError::Resolve {
                addr: addr.to_string(),
            })?
            .collect();

        let mut last_err = None;
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(Self {
                        stream,
                        peer: candidate,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(match last_err {
            Some(source) => ChannelError::Connect {
                addr: addr.to_string(),
                source,
            },
            None => ChannelError::Resolve {
                addr: addr.to_string(),
            },
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Flush and close. Errors are ignored; teardown always completes.
    pub fn teardown(mut self) {
        let _ = self.stream.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Block until the peer sends one byte.
pub fn read_ready_byte<R: Read>(reader: &mut R) -> Result<u8, ChannelError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Err(ChannelError::Closed),
            Ok(_) => return Ok(byte[0]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Running channel thread. Dropping the handle stops the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    name: &'static str,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    socket: Arc<Mutex<Option<TcpStream>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Unblocks a loop parked in a socket read.
        if let Some(socket) = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = socket.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connect on a fresh thread, then run `cycle` every `settings.interval` until stopped
/// or the connection closes.
pub fn spawn_channel<C>(settings: ChannelSettings, mut cycle: C) -> ChannelHandle
where
    C: FnMut(&mut TcpStream) -> Result<(), ChannelError> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let state = Arc::new(AtomicU8::new(ChannelState::Connecting.as_u8()));
    let socket = Arc::new(Mutex::new(None::<TcpStream>));

    let running_flag = running.clone();
    let state_ref = state.clone();
    let socket_ref = socket.clone();
    let name = settings.name;

    let handle = thread::spawn(move || {
        let set_state = |s: ChannelState| state_ref.store(s.as_u8(), Ordering::Release);

        log::info!("{name} channel connecting to {}", settings.addr);
        let mut connection = match ChannelConnection::connect(&settings.addr, settings.connect_timeout) {
            Ok(connection) => connection,
            Err(err) => {
                log::error!("{name} channel: {err}");
                set_state(ChannelState::Disconnected);
                return;
            }
        };

        match connection.try_clone_stream() {
            Ok(clone) => {
                *socket_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(clone);
            }
            Err(err) => log::warn!("{name} channel could not clone socket for shutdown: {err:?}"),
        }

        if running_flag.load(Ordering::SeqCst) {
            set_state(ChannelState::Streaming);
            log::info!("{name} channel streaming to {}", connection.peer());
        }

        while running_flag.load(Ordering::SeqCst) {
            match cycle(connection.stream_mut()) {
                Ok(()) => {}
                Err(err) if !running_flag.load(Ordering::SeqCst) => {
                    log::debug!("{name} channel cycle interrupted by stop: {err}");
                    break;
                }
                Err(err) if err.is_closed() => {
                    log::error!("{name} channel lost connection: {err}");
                    break;
                }
                Err(err) => {
                    log::warn!("{name} channel cycle failed: {err}");
                }
            }
            sleep_while_running(&running_flag, settings.interval);
        }

        connection.teardown();
        socket_ref
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        set_state(ChannelState::Disconnected);
        log::info!("{name} channel stopped");
    });

    ChannelHandle {
        name,
        running,
        state,
        socket,
        handle: Some(handle),
    }
}

fn sleep_while_running(running: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}
