//! SOCK_SEQPACKET unix transport.
//!
//! The protocol requires a connection-oriented, packet-framed transport: one
//! `send` is exactly one receivable unit, never split or merged. Unix
//! seqpacket sockets provide that natively, so the codec never has to guess
//! at reassembly. The standard library has no seqpacket type, so the socket
//! calls go through `libc` directly.

use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors raised while setting up or using the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket path too long for sockaddr_un: {0}")]
    PathTooLong(PathBuf),

    #[error("socket() failed: {0}")]
    Socket(#[source] io::Error),

    #[error("bind({path}) failed: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("listen() failed: {0}")]
    Listen(#[source] io::Error),

    #[error("connect({path}) failed: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fcntl() failed: {0}")]
    Fcntl(#[source] io::Error),
}

fn sockaddr_for(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t), TransportError> {
    let bytes = OsStr::new(path).as_bytes();
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    if bytes.len() >= addr.sun_path.len() {
        return Err(TransportError::PathTooLong(path.to_path_buf()));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, &src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = src as libc::c_char;
    }
    Ok((addr, std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t))
}

fn new_seqpacket_socket() -> Result<OwnedFd, TransportError> {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(TransportError::Socket(io::Error::last_os_error()));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// A connected seqpacket endpoint.
///
/// Sending is atomic per message, so a single stream may be shared across
/// threads behind an `Arc`: the server's input fan-out writes from the
/// registry while the owning session thread reads.
#[derive(Debug)]
pub struct SeqPacketStream {
    fd: OwnedFd,
}

impl SeqPacketStream {
    /// Connects to the server endpoint at `path`.
    pub fn connect(path: &Path) -> Result<Self, TransportError> {
        let fd = new_seqpacket_socket()?;
        let (addr, len) = sockaddr_for(path)?;
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if rc != 0 {
            return Err(TransportError::Connect {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { fd })
    }

    pub(crate) fn from_owned(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Sends one whole message as one packet.
    pub fn send_packet(&self, bytes: &[u8]) -> io::Result<()> {
        let rc = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Receives one whole packet into `buf`, returning its length.
    ///
    /// `Ok(0)` means the peer closed the connection. An error other than
    /// `WouldBlock` is treated by every caller exactly like `Ok(0)`: the
    /// design deliberately does not distinguish I/O failure from EOF.
    pub fn recv_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
        let rc = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc as usize)
    }

    /// Switches the receive side between blocking and non-blocking polling.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), TransportError> {
        let fd = self.fd.as_raw_fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        if flags < 0 {
            return Err(TransportError::Fcntl(io::Error::last_os_error()));
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
            return Err(TransportError::Fcntl(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl AsRawFd for SeqPacketStream {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// The server's listening endpoint. Unlinks a stale socket file on bind and
/// removes its own on drop.
#[derive(Debug)]
pub struct SeqPacketListener {
    fd: OwnedFd,
    path: PathBuf,
}

impl SeqPacketListener {
    /// Binds and listens on `path` with the given backlog.
    pub fn bind(path: &Path, backlog: i32) -> Result<Self, TransportError> {
        let fd = new_seqpacket_socket()?;
        let (addr, len) = sockaddr_for(path)?;
        // A previous server instance may have left its socket file behind.
        let _ = std::fs::remove_file(path);
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if rc != 0 {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }
        if unsafe { libc::listen(fd.as_raw_fd(), backlog) } != 0 {
            return Err(TransportError::Listen(io::Error::last_os_error()));
        }
        debug!(path = %path.display(), "listening");
        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Blocks until the next backend connects.
    pub fn accept(&self) -> io::Result<SeqPacketStream> {
        let fd = unsafe { libc::accept(self.fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(SeqPacketStream::from_owned(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SeqPacketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket_path(name: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so the path survives the helper; the listener
        // removes the socket file itself.
        let path = dir.path().join(name);
        std::mem::forget(dir);
        path
    }

    #[test]
    fn test_one_send_is_one_receive() {
        let path = temp_socket_path("pkt.sock");
        let listener = SeqPacketListener::bind(&path, 4).unwrap();
        let client = SeqPacketStream::connect(&path).unwrap();
        let server_side = listener.accept().unwrap();

        client.send_packet(b"one").unwrap();
        client.send_packet(b"two").unwrap();

        let mut buf = [0u8; 16];
        let n = server_side.recv_packet(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"one");
        let n = server_side.recv_packet(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[test]
    fn test_peer_close_reads_as_zero() {
        let path = temp_socket_path("eof.sock");
        let listener = SeqPacketListener::bind(&path, 4).unwrap();
        let client = SeqPacketStream::connect(&path).unwrap();
        let server_side = listener.accept().unwrap();
        drop(client);

        let mut buf = [0u8; 16];
        assert_eq!(server_side.recv_packet(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_nonblocking_recv_returns_would_block() {
        let path = temp_socket_path("nb.sock");
        let listener = SeqPacketListener::bind(&path, 4).unwrap();
        let client = SeqPacketStream::connect(&path).unwrap();
        let _server_side = listener.accept().unwrap();

        client.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 16];
        let err = client.recv_packet(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_bind_replaces_stale_socket_file() {
        let path = temp_socket_path("stale.sock");
        let first = SeqPacketListener::bind(&path, 4).unwrap();
        // Simulate a crashed server: file left behind, listener gone.
        std::mem::forget(first);
        let second = SeqPacketListener::bind(&path, 4);
        assert!(second.is_ok());
    }
}
