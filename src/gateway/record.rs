//! FastCGI record framing.
//!
//! ```text
//! +---------+------+------------+---------------+---------------+----------+
//! | version | type | request id | content len   | padding len   | reserved |
//! |   u8    |  u8  |   u16 be   |    u16 be     |      u8       |    u8    |
//! +---------+------+------------+---------------+---------------+----------+
//! | content (content len bytes) | padding (padding len bytes)              |
//! +-----------------------------+------------------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::gateway::GatewayError;

/// Protocol version spoken.
pub const VERSION_1: u8 = 1;

/// Fixed header length.
pub const HEADER_LEN: usize = 8;

/// Largest content a single record can carry.
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

/// Request ID reserved for management records.
pub const MANAGEMENT_REQUEST_ID: u16 = 0;

/// `BEGIN_REQUEST` flag asking the application to keep the connection open.
pub const FLAG_KEEP_CONN: u8 = 1;

/// Record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
    Other(u8),
}

impl RecordType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordType::BeginRequest,
            2 => RecordType::AbortRequest,
            3 => RecordType::EndRequest,
            4 => RecordType::Params,
            5 => RecordType::Stdin,
            6 => RecordType::Stdout,
            7 => RecordType::Stderr,
            8 => RecordType::Data,
            9 => RecordType::GetValues,
            10 => RecordType::GetValuesResult,
            11 => RecordType::UnknownType,
            other => RecordType::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RecordType::BeginRequest => 1,
            RecordType::AbortRequest => 2,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Stderr => 7,
            RecordType::Data => 8,
            RecordType::GetValues => 9,
            RecordType::GetValuesResult => 10,
            RecordType::UnknownType => 11,
            RecordType::Other(other) => *other,
        }
    }
}

/// Role requested by `BEGIN_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Responder,
    Authorizer,
    Filter,
    Other(u16),
}

impl Role {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Role::Responder,
            2 => Role::Authorizer,
            3 => Role::Filter,
            other => Role::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Role::Responder => 1,
            Role::Authorizer => 2,
            Role::Filter => 3,
            Role::Other(other) => *other,
        }
    }
}

/// `protocolStatus` of an `END_REQUEST` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolStatus {
    RequestComplete = 0,
    CantMultiplex = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

/// Body of a `BEGIN_REQUEST` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    pub role: Role,
    pub keep_conn: bool,
}

impl BeginRequest {
    pub fn parse(content: &[u8]) -> Result<Self, GatewayError> {
        if content.len() < 8 {
            return Err(GatewayError::Protocol(format!(
                "BEGIN_REQUEST body is {} bytes, expected 8",
                content.len()
            )));
        }
        Ok(Self {
            role: Role::from_u16(u16::from_be_bytes([content[0], content[1]])),
            keep_conn: content[2] & FLAG_KEEP_CONN != 0,
        })
    }
}

/// One FastCGI record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordType,
    pub request_id: u16,
    pub content: Bytes,
}

impl Record {
    pub fn new(kind: RecordType, request_id: u16, content: impl Into<Bytes>) -> Self {
        Self {
            kind,
            request_id,
            content: content.into(),
        }
    }

    pub fn begin_request(request_id: u16, role: Role, keep_conn: bool) -> Self {
        let mut body = BytesMut::with_capacity(8);
        body.put_u16(role.as_u16());
        body.put_u8(if keep_conn { FLAG_KEEP_CONN } else { 0 });
        body.put_bytes(0, 5);
        Self::new(RecordType::BeginRequest, request_id, body.freeze())
    }

    pub fn end_request(request_id: u16, app_status: u32, status: ProtocolStatus) -> Self {
        let mut body = BytesMut::with_capacity(8);
        body.put_u32(app_status);
        body.put_u8(status as u8);
        body.put_bytes(0, 3);
        Self::new(RecordType::EndRequest, request_id, body.freeze())
    }

    pub fn unknown_type(kind: u8) -> Self {
        let mut body = BytesMut::with_capacity(8);
        body.put_u8(kind);
        body.put_bytes(0, 7);
        Self::new(RecordType::UnknownType, MANAGEMENT_REQUEST_ID, body.freeze())
    }

    pub fn stdout(request_id: u16, content: impl Into<Bytes>) -> Self {
        Self::new(RecordType::Stdout, request_id, content)
    }

    /// `true` for the empty record terminating a stream.
    pub fn is_end_of_stream(&self) -> bool {
        self.content.is_empty()
    }
}

/// Codec for FastCGI records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>, GatewayError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let version = src[0];
        if version != VERSION_1 {
            return Err(GatewayError::Protocol(format!(
                "unsupported record version {}",
                version
            )));
        }

        let kind = RecordType::from_u8(src[1]);
        let request_id = u16::from_be_bytes([src[2], src[3]]);
        let content_len = u16::from_be_bytes([src[4], src[5]]) as usize;
        let padding_len = src[6] as usize;

        let total = HEADER_LEN + content_len + padding_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let content = src.split_to(content_len).freeze();
        src.advance(padding_len);

        Ok(Some(Record {
            kind,
            request_id,
            content,
        }))
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = GatewayError;

    fn encode(&mut self, record: Record, dst: &mut BytesMut) -> Result<(), GatewayError> {
        let content_len = record.content.len();
        if content_len > MAX_CONTENT_LEN {
            return Err(GatewayError::Protocol(format!(
                "record content of {} bytes exceeds {}",
                content_len, MAX_CONTENT_LEN
            )));
        }
        let padding_len = (8 - content_len % 8) % 8;

        dst.reserve(HEADER_LEN + content_len + padding_len);
        dst.put_u8(VERSION_1);
        dst.put_u8(record.kind.as_u8());
        dst.put_u16(record.request_id);
        dst.put_u16(content_len as u16);
        dst.put_u8(padding_len as u8);
        dst.put_u8(0);
        dst.extend_from_slice(&record.content);
        dst.put_bytes(0, padding_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_records_are_padded_to_eight_bytes() {
        let mut buf = BytesMut::new();
        RecordCodec
            .encode(Record::stdout(7, Bytes::from_static(b"hello")), &mut buf)
            .unwrap();

        assert_eq!(buf.len(), HEADER_LEN + 8);
        assert_eq!(&buf[..HEADER_LEN], &[1, 6, 0, 7, 0, 5, 3, 0]);
        assert_eq!(&buf[HEADER_LEN..HEADER_LEN + 5], b"hello");
    }

    #[test]
    fn decoder_waits_for_complete_record() {
        let mut full = BytesMut::new();
        RecordCodec
            .encode(Record::new(RecordType::Stdin, 1, Bytes::from_static(b"abc")), &mut full)
            .unwrap();

        let mut partial = BytesMut::from(&full[..HEADER_LEN + 2]);
        assert_eq!(RecordCodec.decode(&mut partial).unwrap(), None);

        partial.extend_from_slice(&full[HEADER_LEN + 2..]);
        let record = RecordCodec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(record.kind, RecordType::Stdin);
        assert_eq!(record.request_id, 1);
        assert_eq!(&record.content[..], b"abc");
        assert!(partial.is_empty());
    }

    #[test]
    fn decoder_honours_foreign_padding() {
        // Padding chosen by the peer need not be minimal.
        let mut buf = BytesMut::from(&[1u8, 5, 0, 2, 0, 1, 10, 0][..]);
        buf.extend_from_slice(b"x");
        buf.extend_from_slice(&[0u8; 10]);
        buf.extend_from_slice(&[1u8, 5, 0, 2, 0, 0, 0, 0]);

        let first = RecordCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first.content[..], b"x");
        let second = RecordCodec.decode(&mut buf).unwrap().unwrap();
        assert!(second.is_end_of_stream());
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut buf = BytesMut::from(&[2u8, 1, 0, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            RecordCodec.decode(&mut buf),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn oversized_content_is_rejected() {
        let mut buf = BytesMut::new();
        let record = Record::stdout(1, vec![0u8; MAX_CONTENT_LEN + 1]);
        assert!(RecordCodec.encode(record, &mut buf).is_err());
    }

    #[test]
    fn begin_request_flags() {
        let record = Record::begin_request(3, Role::Responder, true);
        let begin = BeginRequest::parse(&record.content).unwrap();
        assert_eq!(begin.role, Role::Responder);
        assert!(begin.keep_conn);

        assert!(BeginRequest::parse(&[0, 1]).is_err());
    }

    #[test]
    fn end_request_layout() {
        let record = Record::end_request(9, 0, ProtocolStatus::UnknownRole);
        assert_eq!(record.kind, RecordType::EndRequest);
        assert_eq!(&record.content[..], &[0, 0, 0, 0, 3, 0, 0, 0]);
    }
}
