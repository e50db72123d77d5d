//! FastCGI record framing.
//!
//! Every record is an 8-byte header followed by `content_length` bytes of
//! content and `padding_length` bytes of padding:
//!
//! ```text
//! version:u8 | type:u8 | request_id:u16be | content_length:u16be | padding_length:u8 | reserved:u8
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::fastcgi::error::FastCgiError;

pub const FCGI_VERSION_1: u8 = 1;
pub const HEADER_LEN: usize = 8;
/// Largest content a single record can carry.
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

/// The only role this client speaks.
pub const ROLE_RESPONDER: u16 = 1;

/// END_REQUEST protocol status values.
pub const REQUEST_COMPLETE: u8 = 0;
pub const CANT_MPX_CONN: u8 = 1;
pub const OVERLOADED: u8 = 2;
pub const UNKNOWN_ROLE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

impl TryFrom<u8> for RecordType {
    type Error = FastCgiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            other => return Err(FastCgiError::Protocol(format!("unknown record type {other}"))),
        })
    }
}

/// Padding that brings `content_len` up to a multiple of 8.
pub fn padding_len(content_len: usize) -> usize {
    (8 - content_len % 8) % 8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub request_id: u16,
    pub content: Vec<u8>,
}

impl Record {
    pub fn new(record_type: RecordType, request_id: u16, content: Vec<u8>) -> Self {
        Self {
            record_type,
            request_id,
            content,
        }
    }

    /// BEGIN_REQUEST for the responder role, connection closed after the request.
    pub fn begin_request(request_id: u16) -> Self {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&ROLE_RESPONDER.to_be_bytes());
        body.push(0); // flags: no keep-conn
        body.extend_from_slice(&[0; 5]);
        Self::new(RecordType::BeginRequest, request_id, body)
    }

    /// Append the wire form of this record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), FastCgiError> {
        let len = self.content.len();
        if len > MAX_CONTENT_LEN {
            return Err(FastCgiError::Protocol(format!(
                "record content of {len} bytes exceeds {MAX_CONTENT_LEN}"
            )));
        }
        let padding = padding_len(len);

        out.reserve(HEADER_LEN + len + padding);
        out.push(FCGI_VERSION_1);
        out.push(self.record_type as u8);
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.push(padding as u8);
        out.push(0);
        out.extend_from_slice(&self.content);
        out.resize(out.len() + padding, 0);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, FastCgiError> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode one record from the front of `buf`, returning it and the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FastCgiError> {
        if buf.len() < HEADER_LEN {
            return Err(FastCgiError::Protocol("truncated record header".into()));
        }
        let header = Header::parse(buf[..HEADER_LEN].try_into().map_err(|_| {
            FastCgiError::Protocol("truncated record header".into())
        })?)?;

        let total = HEADER_LEN + header.content_len + header.padding_len;
        if buf.len() < total {
            return Err(FastCgiError::Protocol("truncated record body".into()));
        }
        let content = buf[HEADER_LEN..HEADER_LEN + header.content_len].to_vec();
        Ok((
            Self::new(header.record_type, header.request_id, content),
            total,
        ))
    }

    /// Read one record. `Ok(None)` means the peer closed the stream cleanly
    /// on a record boundary.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>, FastCgiError>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader.read(&mut raw[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FastCgiError::Protocol("truncated record header".into()));
            }
            filled += n;
        }

        let header = Header::parse(raw)?;
        let mut body = vec![0u8; header.content_len + header.padding_len];
        reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FastCgiError::Protocol("truncated record body".into())
            } else {
                FastCgiError::Io(e)
            }
        })?;
        body.truncate(header.content_len);

        Ok(Some(Self::new(header.record_type, header.request_id, body)))
    }
}

struct Header {
    record_type: RecordType,
    request_id: u16,
    content_len: usize,
    padding_len: usize,
}

impl Header {
    fn parse(raw: [u8; HEADER_LEN]) -> Result<Self, FastCgiError> {
        if raw[0] != FCGI_VERSION_1 {
            return Err(FastCgiError::Protocol(format!("unsupported version {}", raw[0])));
        }
        Ok(Self {
            record_type: RecordType::try_from(raw[1])?,
            request_id: u16::from_be_bytes([raw[2], raw[3]]),
            content_len: u16::from_be_bytes([raw[4], raw[5]]) as usize,
            padding_len: raw[6] as usize,
        })
    }
}

/// Split `data` into records of at most [`MAX_CONTENT_LEN`] bytes, followed
/// by the empty record that terminates the stream.
pub fn encode_stream(
    record_type: RecordType,
    request_id: u16,
    data: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), FastCgiError> {
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        Record::new(record_type, request_id, chunk.to_vec()).encode_into(out)?;
    }
    Record::new(record_type, request_id, Vec::new()).encode_into(out)
}

/// Body of an END_REQUEST record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequest {
    pub app_status: u32,
    pub protocol_status: u8,
}

impl EndRequest {
    pub fn parse(content: &[u8]) -> Result<Self, FastCgiError> {
        if content.len() < 5 {
            return Err(FastCgiError::Protocol("short END_REQUEST body".into()));
        }
        Ok(Self {
            app_status: u32::from_be_bytes([content[0], content[1], content[2], content[3]]),
            protocol_status: content[4],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&self.app_status.to_be_bytes());
        body.push(self.protocol_status);
        body.extend_from_slice(&[0; 3]);
        body
    }
}
