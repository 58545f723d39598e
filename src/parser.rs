//! Parser and serialization of the TFTP [`Packet`], including the
//! [RFC 2347](https://datatracker.ietf.org/doc/html/rfc2347) option list

use byte_strings::c_str;
use std::{
    ffi::{CStr, CString},
    fmt::Display,
};
use thiserror::Error;

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Unspec = 0,
    NoFile = 1,
    Access = 2,
    Write = 3,
    Op = 4,
    BadId = 5,
    Exist = 6,
    BadUser = 7,
    BadOpt = 8,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Unspec => write!(f, "Not defined, see error message"),
            ErrorCode::NoFile => write!(f, "File not found"),
            ErrorCode::Access => write!(f, "Access violation"),
            ErrorCode::Write => write!(f, "Disk full or allocation exceeded"),
            ErrorCode::Op => write!(f, "Illegal TFTP operation"),
            ErrorCode::BadId => write!(f, "Unknown transfer ID"),
            ErrorCode::Exist => write!(f, "File already exists"),
            ErrorCode::BadUser => write!(f, "No such user"),
            ErrorCode::BadOpt => write!(f, "Bad option"),
        }
    }
}

impl ErrorCode {
    fn from_u16(v: u16) -> Result<Self, Error> {
        Ok(match v {
            0 => ErrorCode::Unspec,
            1 => ErrorCode::NoFile,
            2 => ErrorCode::Access,
            3 => ErrorCode::Write,
            4 => ErrorCode::Op,
            5 => ErrorCode::BadId,
            6 => ErrorCode::Exist,
            7 => ErrorCode::BadUser,
            8 => ErrorCode::BadOpt,
            _ => return Err(Error::BadErrorCode(v)),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestMode {
    Octet,
    NetAscii,
    Mail,
}

impl Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMode::Octet => write!(f, "octet"),
            RequestMode::NetAscii => write!(f, "netascii"),
            RequestMode::Mail => write!(f, "mail"),
        }
    }
}

impl RequestMode {
    fn from_cstr(str: &CStr) -> Result<Self, Error> {
        Ok(
            match str
                .to_str()
                .map_err(|_| Error::BadString)?
                .to_ascii_lowercase()
                .as_str()
            {
                "octet" => Self::Octet,
                "netascii" => Self::NetAscii,
                "mail" => Self::Mail,
                _ => return Err(Error::BadString),
            },
        )
    }

    fn into_cstr(self) -> &'static CStr {
        match self {
            RequestMode::Octet => c_str!("octet"),
            RequestMode::NetAscii => c_str!("netascii"),
            RequestMode::Mail => c_str!("mail"),
        }
    }
}

/// Parse a NUL-delimited option list into ordered (key, value) pairs.
///
/// Keys and values strictly alternate on the wire. Malformed input fails
/// quietly: a key without a value pairs with the empty string (matching the
/// trailing-NUL framing) and parsing stops at the first segment that isn't
/// valid UTF-8. Keys are returned literally, without case folding.
pub fn parse_options(bytes: &[u8]) -> Vec<(String, String)> {
    let parts: Vec<&[u8]> = bytes.split(|b| *b == 0).collect();
    let mut options = vec![];
    let mut i = 0;
    while i + 1 < parts.len() {
        let (Ok(key), Ok(value)) = (
            std::str::from_utf8(parts[i]),
            std::str::from_utf8(parts[i + 1]),
        ) else {
            break;
        };
        options.push((key.to_string(), value.to_string()));
        i += 2;
    }
    options
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest {
        filename: CString,
        mode: RequestMode,
        options: Vec<(String, String)>,
    },
    WriteRequest {
        filename: CString,
        mode: RequestMode,
        options: Vec<(String, String)>,
    },
    Data {
        block_n: u16,
        data: Vec<u8>,
    },
    Acknowledgment {
        block_n: u16,
    },
    Error {
        code: ErrorCode,
        msg: CString,
    },
    OptionAck {
        options: Vec<(String, String)>,
    },
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Packet::ReadRequest {
                filename,
                mode,
                options,
            } => {
                write!(f, "RRQ {} {mode}", filename.to_str().unwrap())?;
                for (k, v) in options {
                    write!(f, " {k}={v}")?;
                }
                Ok(())
            }
            Packet::WriteRequest {
                filename,
                mode,
                options,
            } => {
                write!(f, "WRQ {} {mode}", filename.to_str().unwrap())?;
                for (k, v) in options {
                    write!(f, " {k}={v}")?;
                }
                Ok(())
            }
            Packet::Data { block_n, data: _ } => write!(f, "DATA block:{block_n}"),
            Packet::Acknowledgment { block_n } => write!(f, "ACK block:{block_n}"),
            Packet::Error { code, msg } => {
                write!(f, "ERROR code:{code} msg:{}", msg.to_str().unwrap())
            }
            Packet::OptionAck { options } => {
                write!(f, "OACK")?;
                for (k, v) in options {
                    write!(f, " {k}={v}")?;
                }
                Ok(())
            }
        }
    }
}

impl Packet {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![];
        match self {
            Packet::ReadRequest {
                filename,
                mode,
                options,
            } => {
                buf.extend_from_slice(&1u16.to_be_bytes());
                buf.extend_from_slice(filename.to_bytes_with_nul());
                buf.extend_from_slice(mode.into_cstr().to_bytes_with_nul());
                for (k, v) in options {
                    buf.extend_from_slice(k.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(v.as_bytes());
                    buf.push(0);
                }
            }
            Packet::WriteRequest {
                filename,
                mode,
                options,
            } => {
                buf.extend_from_slice(&2u16.to_be_bytes());
                buf.extend_from_slice(filename.to_bytes_with_nul());
                buf.extend_from_slice(mode.into_cstr().to_bytes_with_nul());
                for (k, v) in options {
                    buf.extend_from_slice(k.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(v.as_bytes());
                    buf.push(0);
                }
            }
            Packet::Data { block_n, data } => {
                buf.extend_from_slice(&3u16.to_be_bytes());
                buf.extend_from_slice(&block_n.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Packet::Acknowledgment { block_n } => {
                buf.extend_from_slice(&4u16.to_be_bytes());
                buf.extend_from_slice(&block_n.to_be_bytes());
            }
            Packet::Error { code, msg } => {
                buf.extend_from_slice(&5u16.to_be_bytes());
                buf.extend_from_slice(&(*code as u16).to_be_bytes());
                buf.extend_from_slice(msg.as_bytes_with_nul());
            }
            Packet::OptionAck { options } => {
                buf.extend_from_slice(&6u16.to_be_bytes());
                for (k, v) in options {
                    buf.extend_from_slice(k.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(v.as_bytes());
                    buf.push(0);
                }
            }
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            // Check against the smallest payload size (ACK)
            return Err(Error::Incomplete(bytes.len()));
        }
        // Now we're guaranteed to at least have the opcode
        let opcode = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let body = &bytes[2..];
        match opcode {
            // RRQ
            1 => {
                // Smallest size after the opcode is 7 bytes
                // 2 bytes for 1 char filename and 5 bytes for "mail" mode
                if body.len() < 7 {
                    Err(Error::Incomplete(body.len()))
                } else {
                    // Filename and mode, then the (possibly empty) option list
                    let mut iter = body.splitn(3, |x| *x == 0);
                    let filename = iter.next().ok_or(Error::Incomplete(0))?;
                    let mode = iter.next().ok_or(Error::Incomplete(0))?;
                    let options = parse_options(iter.next().unwrap_or(&[]));
                    Ok(Packet::ReadRequest {
                        filename: CString::new(filename).map_err(|_| Error::BadString)?,
                        mode: RequestMode::from_cstr(
                            &CString::new(mode).map_err(|_| Error::BadString)?,
                        )?,
                        options,
                    })
                }
            }
            // WRQ
            2 => {
                // Same story as RRQ, but different discriminant
                if body.len() < 7 {
                    Err(Error::Incomplete(body.len()))
                } else {
                    let mut iter = body.splitn(3, |x| *x == 0);
                    let filename = iter.next().ok_or(Error::Incomplete(0))?;
                    let mode = iter.next().ok_or(Error::Incomplete(0))?;
                    let options = parse_options(iter.next().unwrap_or(&[]));
                    Ok(Packet::WriteRequest {
                        filename: CString::new(filename).map_err(|_| Error::BadString)?,
                        mode: RequestMode::from_cstr(
                            &CString::new(mode).map_err(|_| Error::BadString)?,
                        )?,
                        options,
                    })
                }
            }
            // DATA
            3 => {
                // Minimum data body size is a block num of 2 bytes and 0 data bytes,
                if body.len() < 2 {
                    Err(Error::Incomplete(body.len()))
                } else {
                    let block_n = u16::from_be_bytes(body[..2].try_into().unwrap());
                    let data = body[2..].to_vec();
                    Ok(Packet::Data { block_n, data })
                }
            }
            // ACK
            4 => {
                // We've already checked length for this smallest payload
                let block_n = u16::from_be_bytes(body[..2].try_into().unwrap());
                Ok(Packet::Acknowledgment { block_n })
            }
            // ERROR
            5 => {
                // Minimum size here is 3 bytes, 2 for the error code and 1 for a zero length string (null byte)
                if body.len() < 3 {
                    Err(Error::Incomplete(body.len()))
                } else {
                    let code =
                        ErrorCode::from_u16(u16::from_be_bytes(body[0..2].try_into().unwrap()))?;
                    // The rest should have exactly one null byte at the end for the string
                    if *body[2..].last().unwrap() != 0 {
                        Err(Error::BadString)
                    } else {
                        let msg = CString::new(&body[2..(body.len() - 1)])
                            .map_err(|_| Error::BadString)?;
                        Ok(Packet::Error { code, msg })
                    }
                }
            }
            // OACK
            6 => Ok(Packet::OptionAck {
                options: parse_options(body),
            }),
            _ => Err(Error::BadOpcode(opcode)),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Too few bytes recieved - `{0}`")]
    Incomplete(usize),
    #[error("Opcode wasn't expected - `{0}`")]
    BadOpcode(u16),
    #[error("String in payload wasn't a valid CString or was otherwise invalid")]
    BadString,
    #[error("Error code wasn't recognized - `{0}`")]
    BadErrorCode(u16),
}
