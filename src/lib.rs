//! A TFTP client as specified in [RFC 1350](https://datatracker.ietf.org/doc/html/rfc1350),
//! with block-size negotiation per [RFC 2347](https://datatracker.ietf.org/doc/html/rfc2347)/[RFC 2348](https://datatracker.ietf.org/doc/html/rfc2348)
//!
//! Transfers are synchronous and lockstep: one datagram in flight, a fixed
//! receive timeout, and fixed-interval retransmission of the last
//! unacknowledged packet. Downloads are materialized under a collision-free
//! local filename and the partial file is removed on any failure.

use thiserror::Error;

mod blocking;
pub mod naming;
pub mod parser;

pub use blocking::*;

/// Default TFTP block size
pub const BLKSIZE: usize = 512;
/// Well-known TFTP server port
pub const TFTP_PORT: u16 = 69;

enum State {
    Send,
    SendAgain,
    Recv,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bad filename (not a valid CString)")]
    BadFilename,
    #[error("Socket IO error - `{0}`")]
    SocketIo(std::io::Error),
    #[error("Local file IO error - `{0}`")]
    LocalIo(std::io::Error),
    #[error("No reply from server, retries exhausted")]
    RetryExhausted,
    #[error("Failed to initiate upload")]
    HandshakeFailed,
    #[error("The server reported an error with code `{code:?}` and msg `{msg}`")]
    Protocol {
        code: parser::ErrorCode,
        msg: String,
    },
}
