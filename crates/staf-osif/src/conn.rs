//! Byte-stream connections with length-prefixed string framing.
//!
//! A [`Connection`] moves exact byte counts; unsigned integers travel in
//! little-endian order and strings as a length prefix followed by UTF-8
//! bytes. Transports are Unix domain sockets for local IPC and TCP.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{OsError, OsResult};

/// I/O timeout applied to accepted and connected streams.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(120);

/// Prefix of local IPC socket file names.
pub const LOCAL_IPC_PREFIX: &str = "STAFIPC_";

/// Largest piece of a string payload read at once. The receive buffer
/// grows by at most this much ahead of the bytes that have arrived.
pub const STRING_READ_CHUNK: usize = 64 * 1024;

fn os_rc(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(0)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn communication(reason: String) -> OsError {
    OsError::Communication { reason }
}

/// A bidirectional byte stream.
pub trait Connection {
    /// Fills `buf` completely.
    fn read(&mut self, buf: &mut [u8]) -> OsResult<()>;

    /// Writes all of `buf`.
    fn write(&mut self, buf: &[u8]) -> OsResult<()>;

    /// Reads a little-endian `u32`.
    fn read_uint(&mut self) -> OsResult<u32> {
        let mut raw = [0u8; 4];
        self.read(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Writes `value` as a little-endian `u32`.
    fn write_uint(&mut self, value: u32) -> OsResult<()> {
        self.write(&value.to_le_bytes())
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> OsResult<String> {
        let len = self.read_uint()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let mut buf = Vec::with_capacity(len.min(STRING_READ_CHUNK));
        while buf.len() < len {
            let start = buf.len();
            let end = start + (len - start).min(STRING_READ_CHUNK);
            buf.resize(end, 0);
            self.read(&mut buf[start..])?;
        }
        String::from_utf8(buf).map_err(|e| OsError::InvalidValue {
            reason: format!("received string is not valid UTF-8: {e}"),
        })
    }

    /// Writes `s` with its length prefix. An empty string is a lone zero
    /// length.
    fn write_string(&mut self, s: &str) -> OsResult<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| OsError::invalid_parameter("string too long for length prefix"))?;
        self.write_uint(len)?;
        self.write(s.as_bytes())
    }
}

/// [`Connection`] over any blocking stream.
#[derive(Debug)]
pub struct StreamConnection<S> {
    stream: S,
}

impl<S: Read + Write> StreamConnection<S> {
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Connection for StreamConnection<S> {
    fn read(&mut self, buf: &mut [u8]) -> OsResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(communication(
                        "Error reading from socket: other side closed socket".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout(&e) => {
                    return Err(communication(format!(
                        "select() timeout: recv() osRC={}",
                        os_rc(&e)
                    )))
                }
                Err(e) => {
                    return Err(communication(format!(
                        "Error reading from socket: recv() osRC={}",
                        os_rc(&e)
                    )))
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> OsResult<()> {
        let mut sent = 0;
        while sent < buf.len() {
            match self.stream.write(&buf[sent..]) {
                Ok(0) => {
                    return Err(communication(
                        "Error writing to socket: other side closed socket".to_string(),
                    ))
                }
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout(&e) => {
                    return Err(communication(format!(
                        "select() timeout: send() osRC={}",
                        os_rc(&e)
                    )))
                }
                Err(e) => {
                    return Err(communication(format!(
                        "Error writing to socket: send() osRC={}",
                        os_rc(&e)
                    )))
                }
            }
        }
        self.stream
            .flush()
            .map_err(|e| communication(format!("Error writing to socket: {e}")))
    }
}

/// Source of inbound connections.
pub trait ConnectionProvider {
    /// Connection type produced by [`ConnectionProvider::accept`].
    type Conn: Connection;

    /// Blocks until a peer connects.
    fn accept(&self) -> OsResult<Self::Conn>;
}

/// TCP listener producing [`StreamConnection`]s.
#[derive(Debug)]
pub struct TcpConnectionProvider {
    listener: TcpListener,
    io_timeout: Option<Duration>,
}

impl TcpConnectionProvider {
    /// Listens on `addr`.
    pub fn bind(addr: impl ToSocketAddrs) -> OsResult<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| OsError::from_io("bind", e))?;
        debug!(addr = ?listener.local_addr().ok(), "tcp provider listening");
        Ok(Self {
            listener,
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
        })
    }

    /// Overrides the I/O timeout of accepted connections; `None` blocks
    /// forever.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// The bound address.
    pub fn local_addr(&self) -> OsResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| OsError::from_io("getsockname", e))
    }

    /// Opens a connection to `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> OsResult<StreamConnection<TcpStream>> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| communication(format!("Error connecting to endpoint: {e}")))?;
        configure_tcp(&stream, Some(DEFAULT_IO_TIMEOUT))?;
        Ok(StreamConnection::new(stream))
    }
}

fn configure_tcp(stream: &TcpStream, timeout: Option<Duration>) -> OsResult<()> {
    stream
        .set_read_timeout(timeout)
        .and_then(|()| stream.set_write_timeout(timeout))
        .and_then(|()| stream.set_nodelay(true))
        .map_err(|e| OsError::from_io("setsockopt", e))
}

impl ConnectionProvider for TcpConnectionProvider {
    type Conn = StreamConnection<TcpStream>;

    fn accept(&self) -> OsResult<Self::Conn> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted tcp connection");
                    configure_tcp(&stream, self.io_timeout)?;
                    return Ok(StreamConnection::new(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(OsError::from_io("accept", e)),
            }
        }
    }
}

#[cfg(unix)]
pub use local::LocalConnectionProvider;

#[cfg(unix)]
mod local {
    use std::io;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use tracing::{debug, warn};

    use super::{
        communication, ConnectionProvider, StreamConnection, DEFAULT_IO_TIMEOUT, LOCAL_IPC_PREFIX,
    };
    use crate::config::RuntimeConfig;
    use crate::error::{OsError, OsResult};

    /// Unix domain socket listener at `<temp_dir>/STAFIPC_<name>`.
    ///
    /// The socket file is removed when the provider is dropped.
    #[derive(Debug)]
    pub struct LocalConnectionProvider {
        listener: UnixListener,
        socket_path: PathBuf,
        io_timeout: Option<Duration>,
    }

    fn socket_path(config: &RuntimeConfig, name: &str) -> OsResult<PathBuf> {
        if name.is_empty() {
            return Err(OsError::invalid_parameter("IPC name must not be empty"));
        }
        Ok(config.temp_dir.join(format!("{LOCAL_IPC_PREFIX}{name}")))
    }

    fn configure(stream: &UnixStream, timeout: Option<Duration>) -> OsResult<()> {
        stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .map_err(|e| OsError::from_io("setsockopt", e))
    }

    impl LocalConnectionProvider {
        /// Listens on the socket for instance `name`, replacing a stale
        /// socket file left by an earlier process.
        pub fn bind(config: &RuntimeConfig, name: &str) -> OsResult<Self> {
            let socket_path = socket_path(config, name)?;
            match std::fs::remove_file(&socket_path) {
                Ok(()) => debug!(path = %socket_path.display(), "removed stale socket"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(OsError::from_io("unlink", e)),
            }

            let listener = UnixListener::bind(&socket_path).map_err(|e| {
                communication(format!(
                    "Error binding server socket: {e}. Delete {} and retry.",
                    socket_path.display()
                ))
            })?;
            debug!(path = %socket_path.display(), "local ipc provider listening");
            Ok(Self {
                listener,
                socket_path,
                io_timeout: Some(DEFAULT_IO_TIMEOUT),
            })
        }

        /// Overrides the I/O timeout of accepted connections.
        pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
            self.io_timeout = timeout;
            self
        }

        /// The socket file.
        pub fn path(&self) -> &Path {
            &self.socket_path
        }

        /// Opens a connection to the provider for instance `name`.
        pub fn connect(
            config: &RuntimeConfig,
            name: &str,
        ) -> OsResult<StreamConnection<UnixStream>> {
            let path = socket_path(config, name)?;
            let stream = UnixStream::connect(&path)
                .map_err(|e| communication(format!("Error connecting to {}: {e}", path.display())))?;
            configure(&stream, Some(DEFAULT_IO_TIMEOUT))?;
            Ok(StreamConnection::new(stream))
        }
    }

    impl ConnectionProvider for LocalConnectionProvider {
        type Conn = StreamConnection<UnixStream>;

        fn accept(&self) -> OsResult<Self::Conn> {
            loop {
                match self.listener.accept() {
                    Ok((stream, _)) => {
                        configure(&stream, self.io_timeout)?;
                        return Ok(StreamConnection::new(stream));
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(OsError::from_io("accept", e)),
                }
            }
        }
    }

    impl Drop for LocalConnectionProvider {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket");
                }
            }
        }
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn read(&mut self, buf: &mut [u8]) -> OsResult<()> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> OsResult<()> {
        (**self).write(buf)
    }
}
