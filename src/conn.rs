use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use crate::frame::{ResponseFrame, parse_frame};

/// Single receive buffer; responses from the controller fit comfortably.
const RECV_BUF_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, ConnError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| ConnError::Connect {
                target: self.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnError::Connect {
                target: self.to_string(),
                source: io::Error::new(ErrorKind::NotFound, "no address for host"),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connect {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out")]
    Timeout,
    #[error("connection closed by peer")]
    Closed,
    #[error("i/o: {0}")]
    Io(io::Error),
    #[error("malformed response ({0} bytes)")]
    Malformed(usize),
}

impl From<io::Error> for ConnError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnError::Timeout,
            _ => ConnError::Io(e),
        }
    }
}

/// One TCP connection owned by exactly one worker. Dropping it closes the socket.
#[derive(Debug)]
pub struct Conn {
    stream: TcpStream,
}

/// Open a connection; every connect, send and receive on it is bounded by `timeout`.
pub fn connect(target: &Target, timeout: Duration) -> Result<Conn, ConnError> {
    let mut last = None;
    for addr in target.resolve()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok(Conn { stream });
            }
            Err(e) => last = Some(e),
        }
    }
    Err(ConnError::Connect {
        target: target.to_string(),
        source: last.unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no address")),
    })
}

impl Conn {
    /// Re-arm the blocking timeout used for subsequent reads.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ConnError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    /// One blocking read. Zero bytes means the peer closed.
    pub fn recv(&mut self) -> Result<Vec<u8>, ConnError> {
        let mut buf = [0u8; RECV_BUF_LEN];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            return Err(ConnError::Closed);
        }
        Ok(buf[..n].to_vec())
    }

    /// Non-blocking read attempt; `Ok(None)` when nothing is pending.
    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ConnError> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; RECV_BUF_LEN];
        let res = self.stream.read(&mut buf);
        self.stream.set_nonblocking(false)?;
        match res {
            Ok(0) => Err(ConnError::Closed),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Send a frame and decode whatever the single bounded receive returns.
    pub fn round_trip(&mut self, frame: &[u8]) -> Result<ResponseFrame, ConnError> {
        self.send(frame)?;
        let data = self.recv()?;
        parse_frame(&data).ok_or(ConnError::Malformed(data.len()))
    }
}
