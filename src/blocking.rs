//! Blocking implementation of the TFTP client engines

use std::{
    ffi::CString,
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::debug;

use crate::{
    naming,
    parser::{Packet, RequestMode},
    Error, State, BLKSIZE,
};

/// Default per-receive timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default retry budget
pub const DEFAULT_RETRIES: usize = 5;

/// A TFTP client holding the settings shared by every transfer it runs.
///
/// Each [`download`](Client::download) or [`upload`](Client::upload) call
/// owns its own socket and retry counters and runs to completion on the
/// calling thread, so one `Client` can drive transfers from any number of
/// threads.
#[derive(Debug, Clone, Copy)]
pub struct Client {
    timeout: Duration,
    retries: usize,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl Client {
    /// Create a client with a per-receive `timeout` and a retry budget of
    /// `retries` timeouts before a transfer gives up
    pub fn new(timeout: Duration, retries: usize) -> Self {
        Self { timeout, retries }
    }

    /// Download `remote_filename` from a TFTP server into `local_filename`.
    ///
    /// The destination is first made collision-free with
    /// [`naming::unique_path`]; the resolved path is returned on success. On
    /// any failure the partially written file is removed. `blksize` is
    /// requested from the server via the RFC 2348 option and may be changed
    /// by the server's OACK.
    pub fn download<A: ToSocketAddrs>(
        &self,
        server: A,
        remote_filename: &str,
        local_filename: impl AsRef<Path>,
        blksize: usize,
    ) -> Result<PathBuf, Error> {
        let server = resolve(server)?;
        let dest = naming::unique_path(local_filename.as_ref());
        let socket = self.open_socket()?;
        let mut file = File::create(&dest).map_err(Error::LocalIo)?;
        let res = self.fetch(&socket, server, remote_filename, &mut file, blksize);
        drop(file);
        match res {
            Ok(()) => Ok(dest),
            Err(e) => {
                // At most the final complete file or no file at all
                let _ = fs::remove_file(&dest);
                Err(e)
            }
        }
    }

    /// Upload `local_filename` to a TFTP server as `remote_filename`.
    ///
    /// Blocks of `blksize` bytes are sent in lockstep; a file of exactly
    /// `k * blksize` bytes is terminated with an empty DATA block.
    pub fn upload<A: ToSocketAddrs>(
        &self,
        server: A,
        remote_filename: &str,
        local_filename: impl AsRef<Path>,
        blksize: usize,
    ) -> Result<(), Error> {
        let server = resolve(server)?;
        let mut src = File::open(local_filename.as_ref()).map_err(Error::LocalIo)?;
        let socket = self.open_socket()?;
        debug!("┌── PUT {remote_filename}");
        let mut state = State::Send;
        let mut budget = self.retries;
        let mut send_pkt = Packet::WriteRequest {
            filename: CString::new(remote_filename).map_err(|_| Error::BadFilename)?,
            mode: RequestMode::Octet,
            options: vec![],
        };
        let mut dest = server;
        // Block 0 is the WRQ handshake, data blocks start at 1
        let mut current: u16 = 0;
        let mut chunk_len = blksize;
        loop {
            match state {
                State::Send => {
                    // Fresh packet, fresh budget
                    budget = self.retries;
                    debug!("│ TX - {send_pkt}");
                    socket
                        .send_to(&send_pkt.to_bytes(), dest)
                        .map_err(Error::SocketIo)?;
                    state = State::Recv;
                }
                State::SendAgain => {
                    debug!("│ TX - {send_pkt} (Retry)");
                    socket
                        .send_to(&send_pkt.to_bytes(), dest)
                        .map_err(Error::SocketIo)?;
                    state = State::Recv;
                }
                State::Recv => {
                    // Big enough for an ACK or an ERROR with its message
                    let mut buf = vec![0u8; BLKSIZE + 4];
                    let (n, from) = match recv_from_timeout(&socket, &mut buf)? {
                        Some(pair) => pair,
                        None => {
                            debug!("│ Timeout");
                            budget = budget.saturating_sub(1);
                            if budget == 0 {
                                return Err(if current == 0 {
                                    Error::HandshakeFailed
                                } else {
                                    Error::RetryExhausted
                                });
                            }
                            state = State::SendAgain;
                            continue;
                        }
                    };
                    let recv_pkt = match Packet::from_bytes(&buf[..n]) {
                        Ok(pkt) => pkt,
                        Err(e) => {
                            debug!("│ RX - ignoring malformed datagram ({e})");
                            continue;
                        }
                    };
                    debug!("│ RX - {recv_pkt}");
                    match recv_pkt {
                        Packet::Acknowledgment { block_n } if block_n == current => {
                            if current != 0 && chunk_len < blksize {
                                // The short (or empty) final block is acked
                                break;
                            }
                            if current == 0 {
                                // Handshake done, the reply's source is the
                                // transfer address from here on
                                dest = from;
                            }
                            let chunk = read_block(&mut src, blksize).map_err(Error::LocalIo)?;
                            chunk_len = chunk.len();
                            current = current.wrapping_add(1);
                            send_pkt = Packet::Data {
                                block_n: current,
                                data: chunk,
                            };
                            state = State::Send;
                        }
                        Packet::Acknowledgment { .. } => {
                            // Stale ack, push the in-flight packet again
                            state = State::SendAgain;
                        }
                        Packet::Error { code, msg } => {
                            return Err(Error::Protocol {
                                code,
                                msg: msg.to_string_lossy().into_owned(),
                            });
                        }
                        _ => {
                            // Nothing else is meaningful to an upload
                        }
                    }
                }
            }
        }
        debug!("└");
        Ok(())
    }

    /// The download state machine, isolated so the caller can clean up the
    /// destination file on any failure
    fn fetch(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        remote_filename: &str,
        file: &mut File,
        blksize: usize,
    ) -> Result<(), Error> {
        debug!("┌── GET {remote_filename}");
        let rrq = Packet::ReadRequest {
            filename: CString::new(remote_filename).map_err(|_| Error::BadFilename)?,
            mode: RequestMode::Octet,
            options: vec![("blksize".to_string(), blksize.to_string())],
        };
        let mut state = State::Send;
        // One budget for the whole transfer, not reset on progress
        let mut budget = self.retries;
        let mut blksize = blksize;
        let mut send_pkt = rrq.clone();
        let mut dest = server;
        let mut expected: u16 = 1;
        let mut done = false;
        loop {
            match state {
                State::Send => {
                    debug!("│ TX - {send_pkt}");
                    socket
                        .send_to(&send_pkt.to_bytes(), dest)
                        .map_err(Error::SocketIo)?;
                    // Stop once the final block's ACK is out
                    if done {
                        break;
                    }
                    state = State::Recv;
                }
                State::SendAgain => {
                    debug!("│ TX - {send_pkt} (Retry)");
                    socket
                        .send_to(&send_pkt.to_bytes(), dest)
                        .map_err(Error::SocketIo)?;
                    state = State::Recv;
                }
                State::Recv => {
                    let mut buf = vec![0u8; blksize + 4];
                    let (n, from) = match recv_from_timeout(socket, &mut buf)? {
                        Some(pair) => pair,
                        None => {
                            debug!("│ Timeout");
                            budget = budget.saturating_sub(1);
                            if budget == 0 {
                                return Err(Error::RetryExhausted);
                            }
                            if expected == 1 {
                                // Nothing accepted yet, start over with the
                                // request to the well-known port
                                send_pkt = rrq.clone();
                                dest = server;
                            } else {
                                // Nudge the server to resend the next block
                                send_pkt = Packet::Acknowledgment {
                                    block_n: expected.wrapping_sub(1),
                                };
                            }
                            state = State::SendAgain;
                            continue;
                        }
                    };
                    let recv_pkt = match Packet::from_bytes(&buf[..n]) {
                        Ok(pkt) => pkt,
                        Err(e) => {
                            debug!("│ RX - ignoring malformed datagram ({e})");
                            continue;
                        }
                    };
                    debug!("│ RX - {recv_pkt}");
                    match recv_pkt {
                        Packet::Data { block_n, data } => {
                            if block_n == expected {
                                file.write_all(&data).map_err(Error::LocalIo)?;
                                dest = from;
                                send_pkt = Packet::Acknowledgment { block_n };
                                expected = expected.wrapping_add(1);
                                if data.len() < blksize {
                                    done = true;
                                }
                                state = State::Send;
                            } else if block_n < expected {
                                // Stale retransmit, re-ack without writing so
                                // the server stops resending it
                                dest = from;
                                send_pkt = Packet::Acknowledgment { block_n };
                                state = State::Send;
                            }
                            // A block past the expected one can't be acked in
                            // lockstep, drop it
                        }
                        Packet::Error { code, msg } => {
                            return Err(Error::Protocol {
                                code,
                                msg: msg.to_string_lossy().into_owned(),
                            });
                        }
                        Packet::OptionAck { options } => {
                            if let Some(size) = options
                                .iter()
                                .find(|(k, _)| k == "blksize")
                                .and_then(|(_, v)| v.parse().ok())
                            {
                                debug!("│ Negotiated block size {size}");
                                blksize = size;
                            }
                            // The OACK itself is acked with block 0 and fixes
                            // the transfer address; expected stays at 1
                            dest = from;
                            send_pkt = Packet::Acknowledgment { block_n: 0 };
                            state = State::Send;
                        }
                        _ => {
                            // Nothing else is meaningful to a download
                        }
                    }
                }
            }
        }
        debug!("└");
        Ok(())
    }

    fn open_socket(&self) -> Result<UdpSocket, Error> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(Error::SocketIo)?;
        socket
            .set_read_timeout(Some(self.timeout))
            .map_err(Error::SocketIo)?;
        Ok(socket)
    }
}

fn resolve<A: ToSocketAddrs>(server: A) -> Result<SocketAddr, Error> {
    server
        .to_socket_addrs()
        .map_err(Error::SocketIo)?
        .next()
        .ok_or_else(|| Error::SocketIo(ErrorKind::AddrNotAvailable.into()))
}

/// Receive one datagram, `None` on timeout
fn recv_from_timeout(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> Result<Option<(usize, SocketAddr)>, Error> {
    match socket.recv_from(buf) {
        Ok(pair) => Ok(Some(pair)),
        // The timeout kind is platform-dependent
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
        Err(e) => Err(Error::SocketIo(e)),
    }
}

/// Read the next block from the source, short only at end of file
fn read_block(src: &mut File, blksize: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; blksize];
    let mut filled = 0;
    while filled < blksize {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
