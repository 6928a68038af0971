//! The client connection: handshake, mapping, updates, polling.

use std::ffi::{CString, OsStr};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use inkfb_core::domain::surface::{shm_name, SurfaceKey, SurfaceSpec, SOCKET_PATH};
use inkfb_core::protocol::codec::{
    decode_server_message, encode_client_message, ProtocolError, MAX_MESSAGE_SIZE,
};
use inkfb_core::protocol::messages::{ClientMessage, PixelFormat, ServerMessage};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Environment variable carrying the surface key assigned by the launcher.
pub const KEY_ENV: &str = "INKFB_KEY";

/// Errors raised while establishing or using a connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket() failed: {0}")]
    Socket(#[source] io::Error),

    #[error("connect({path}) failed: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("connection I/O failed: {0}")]
    Io(#[source] io::Error),

    #[error("server closed the connection during handshake")]
    Rejected,

    #[error("expected INIT_OK, received {0:?}")]
    UnexpectedReply(ServerMessage),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("shm_open({name}) failed: {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("mmap of {size} bytes failed: {source}")]
    Map {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("fcntl() failed: {0}")]
    Fcntl(#[source] io::Error),
}

/// An established connection with its surface mapped read/write.
#[derive(Debug)]
pub struct ClientConnection {
    socket: OwnedFd,
    shm_fd: OwnedFd,
    ptr: *mut u8,
    len: usize,
    spec: SurfaceSpec,
    key: SurfaceKey,
}

// The mapping is private to this connection; sharing the handle across
// threads is the backend's synchronization problem, not a safety one.
unsafe impl Send for ClientConnection {}

impl ClientConnection {
    /// Connects to the default server endpoint and attaches to `key`.
    ///
    /// With `custom_resolution` the surface gets an explicit geometry instead
    /// of the format's default. With `blocking` false the socket is switched
    /// to non-blocking mode after the handshake, so
    /// [`poll_server_packet`](Self::poll_server_packet) never stalls a render
    /// loop.
    pub fn connect(
        key: SurfaceKey,
        format: PixelFormat,
        custom_resolution: Option<(u16, u16)>,
        blocking: bool,
    ) -> Result<Self, ClientError> {
        Self::connect_at(Path::new(SOCKET_PATH), key, format, custom_resolution, blocking)
    }

    /// [`connect`](Self::connect) against an explicit socket path.
    pub fn connect_at(
        path: &Path,
        key: SurfaceKey,
        format: PixelFormat,
        custom_resolution: Option<(u16, u16)>,
        blocking: bool,
    ) -> Result<Self, ClientError> {
        let socket = connect_seqpacket(path)?;

        let hello = match custom_resolution {
            None => ClientMessage::Initialize { key, format },
            Some((width, height)) => ClientMessage::InitializeCustom {
                key,
                format,
                width,
                height,
            },
        };
        send_packet(&socket, &encode_client_message(&hello)).map_err(ClientError::Io)?;

        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let n = recv_packet(&socket, &mut buf).map_err(ClientError::Io)?;
        if n == 0 {
            return Err(ClientError::Rejected);
        }
        let (shm_id, shm_size) = match decode_server_message(&buf[..n])? {
            ServerMessage::InitOk { shm_id, shm_size } => (shm_id, shm_size),
            other => return Err(ClientError::UnexpectedReply(other)),
        };

        let spec = match custom_resolution {
            None => SurfaceSpec::with_default_resolution(format),
            Some((width, height)) => SurfaceSpec {
                format,
                width: u32::from(width),
                height: u32::from(height),
            },
        };
        let (shm_fd, ptr) = map_surface(shm_id, shm_size as usize)?;

        if !blocking {
            set_nonblocking(&socket)?;
        }
        debug!(key, shm_id, size = shm_size, "surface attached");
        Ok(Self {
            socket,
            shm_fd,
            ptr,
            len: shm_size as usize,
            spec,
            key,
        })
    }

    /// [`connect`](Self::connect) with the fail-fast contract: a backend
    /// without its surface cannot run, so any establishment error is logged
    /// and aborts the process.
    pub fn establish(
        key: SurfaceKey,
        format: PixelFormat,
        custom_resolution: Option<(u16, u16)>,
        blocking: bool,
    ) -> Self {
        match Self::connect(key, format, custom_resolution, blocking) {
            Ok(connection) => connection,
            Err(err) => {
                error!(key, %err, "could not establish surface connection");
                std::process::abort();
            }
        }
    }

    /// Signals that the whole surface changed.
    pub fn send_complete_update(&self) -> Result<(), ClientError> {
        let packet = encode_client_message(&ClientMessage::UpdateAll);
        send_packet(&self.socket, &packet).map_err(ClientError::Io)
    }

    /// Signals that one rectangle changed.
    pub fn send_partial_update(&self, x: i32, y: i32, w: i32, h: i32) -> Result<(), ClientError> {
        let packet = encode_client_message(&ClientMessage::UpdatePartial { x, y, w, h });
        send_packet(&self.socket, &packet).map_err(ClientError::Io)
    }

    /// Receives the next server packet, if any.
    ///
    /// On a non-blocking connection an empty queue yields `None`
    /// immediately; on a blocking one this waits. A closed or broken
    /// connection also yields `None` — a backend that needs to react to the
    /// server going away watches its updates failing instead.
    pub fn poll_server_packet(&self) -> Option<ServerMessage> {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let n = match recv_packet(&self.socket, &mut buf) {
            Ok(0) => return None,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return None,
            Err(_) => return None,
        };
        match decode_server_message(&buf[..n]) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(%err, "discarding malformed server packet");
                None
            }
        }
    }

    pub fn key(&self) -> SurfaceKey {
        self.key
    }

    pub fn spec(&self) -> SurfaceSpec {
        self.spec
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    /// The mapped surface file descriptor, handed out for emulation layers
    /// that need to expose it as a file.
    pub fn shm_fd(&self) -> RawFd {
        self.shm_fd.as_raw_fd()
    }

    /// Mutable view of the pixel bytes.
    pub fn framebuffer(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        let packet = encode_client_message(&ClientMessage::Terminate);
        let _ = send_packet(&self.socket, &packet);
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Reads the launcher-assigned surface key from `INKFB_KEY`.
///
/// Same fail-fast contract as [`ClientConnection::establish`]: a backend
/// started without a key has nothing to attach to.
pub fn surface_key_from_env() -> SurfaceKey {
    match parse_key(std::env::var_os(KEY_ENV).as_deref()) {
        Some(key) => key,
        None => {
            error!("{KEY_ENV} is unset or not an integer");
            std::process::abort();
        }
    }
}

fn parse_key(raw: Option<&OsStr>) -> Option<SurfaceKey> {
    raw?.to_str()?.trim().parse().ok()
}

fn connect_seqpacket(path: &Path) -> Result<OwnedFd, ClientError> {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(ClientError::Socket(io::Error::last_os_error()));
    }
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    let bytes = OsStr::new(path).as_bytes();
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    if bytes.len() >= addr.sun_path.len() {
        return Err(ClientError::Connect {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "socket path too long"),
        });
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, &src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = src as libc::c_char;
    }
    let rc = unsafe {
        libc::connect(
            socket.as_raw_fd(),
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(ClientError::Connect {
            path: path.to_path_buf(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(socket)
}

fn send_packet(socket: &OwnedFd, bytes: &[u8]) -> io::Result<()> {
    let rc = unsafe {
        libc::send(
            socket.as_raw_fd(),
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

fn recv_packet(socket: &OwnedFd, buf: &mut [u8]) -> io::Result<usize> {
    let rc = unsafe {
        libc::recv(
            socket.as_raw_fd(),
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

fn set_nonblocking(socket: &OwnedFd) -> Result<(), ClientError> {
    let fd = socket.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(ClientError::Fcntl(io::Error::last_os_error()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(ClientError::Fcntl(io::Error::last_os_error()));
    }
    Ok(())
}

fn map_surface(shm_id: i32, size: usize) -> Result<(OwnedFd, *mut u8), ClientError> {
    let name = shm_name(shm_id);
    let c_name = match CString::new(name.clone()) {
        Ok(c_name) => c_name,
        Err(_) => {
            return Err(ClientError::ShmOpen {
                name,
                source: io::Error::new(io::ErrorKind::InvalidInput, "NUL in shm name"),
            })
        }
    };
    let raw = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
    if raw < 0 {
        return Err(ClientError::ShmOpen {
            name,
            source: io::Error::last_os_error(),
        });
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(ClientError::Map {
            size,
            source: io::Error::last_os_error(),
        });
    }
    Ok((fd, ptr as *mut u8))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
