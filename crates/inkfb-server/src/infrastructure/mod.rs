//! OS-facing adapters: the seqpacket transport, POSIX shared memory, and
//! configuration loading.

pub mod config;
pub mod shm;
pub mod transport;
