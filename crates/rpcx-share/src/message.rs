//! The wire message type.
//!
//! Framing and encoding are explicitly out of scope of the client core (they're
//! owned by the wire protocol, not by this crate), but something concrete has to
//! satisfy the accessor contract the connection client and governance client are
//! written against (`Seq`, `MessageType`, `IsHeartbeat`, `IsOneway`,
//! `MessageStatusType`, `CompressType`, `SerializeType`, `ServicePath`,
//! `ServiceMethod`, `Metadata`, `Payload`, `Encode`, `Decode`). This module is
//! that minimal concrete implementation.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::Mutex;

use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{CompressType, SerializeType};

pub type Metadata = HashMap<String, String>;

/// Response metadata key carrying a server-raised error message (§7, `ServiceError`).
pub const SERVICE_ERROR_KEY: &str = "__rpcx_error__";

/// Request metadata key the governance client injects when `auth` is configured (§4.4).
pub const AUTH_KEY: &str = "__AUTH";

const MAGIC: u8 = 0x07;
const VERSION: u8 = 0x01;

const FLAG_ONEWAY: u8 = 0b0000_0001;
const FLAG_HEARTBEAT: u8 = 0b0000_0010;
const FLAG_RESPONSE: u8 = 0b0000_0100;
const FLAG_ERROR: u8 = 0b0000_1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatusType {
    Normal,
    Error,
}

/// One request or response on the wire.
#[derive(Debug, Clone)]
pub struct Message {
    pub seq: u64,
    pub message_type: MessageType,
    pub status: MessageStatusType,
    pub heartbeat: bool,
    pub oneway: bool,
    pub serialize_type: SerializeType,
    pub compress_type: CompressType,
    pub service_path: String,
    pub service_method: String,
    pub metadata: Metadata,
    pub payload: Vec<u8>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            seq: 0,
            message_type: MessageType::Request,
            status: MessageStatusType::Normal,
            heartbeat: false,
            oneway: false,
            serialize_type: SerializeType::MsgPack,
            compress_type: CompressType::None,
            service_path: String::new(),
            service_method: String::new(),
            metadata: Metadata::new(),
            payload: Vec::new(),
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_heartbeat(&self) -> bool {
        self.heartbeat
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    /// Encodes the message to bytes. Compresses the payload with gzip when
    /// `compress_type` is `Gzip`.
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.oneway {
            flags |= FLAG_ONEWAY;
        }
        if self.heartbeat {
            flags |= FLAG_HEARTBEAT;
        }
        if self.message_type == MessageType::Response {
            flags |= FLAG_RESPONSE;
        }
        if self.status == MessageStatusType::Error {
            flags |= FLAG_ERROR;
        }

        let payload = match self.compress_type {
            CompressType::None => self.payload.clone(),
            CompressType::Gzip => gzip_compress(&self.payload),
        };

        let mut buf = Vec::with_capacity(32 + self.payload.len());
        buf.push(MAGIC);
        buf.push(VERSION);
        buf.push(flags);
        buf.push(self.serialize_type.as_u8());
        buf.push(self.compress_type.as_u8());
        buf.extend_from_slice(&self.seq.to_be_bytes());

        write_lp_string(&mut buf, &self.service_path);
        write_lp_string(&mut buf, &self.service_method);

        buf.extend_from_slice(&(self.metadata.len() as u32).to_be_bytes());
        for (k, v) in &self.metadata {
            write_lp_string(&mut buf, k);
            write_lp_string(&mut buf, v);
        }

        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);

        buf
    }

    /// Decodes one message from an async buffered reader, returning
    /// `UnexpectedEof` when the stream closes mid-frame and the caller's EOF
    /// otherwise (an empty read before the magic byte).
    pub async fn decode<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Message> {
        let mut header = [0u8; 13];
        read_exact_or_eof(reader, &mut header).await?;

        if header[0] != MAGIC {
            return Err(io::Error::new(ErrorKind::InvalidData, "bad magic byte"));
        }
        let flags = header[2];
        let serialize_type = SerializeType::from_u8(header[3])
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "unknown serialize type"))?;
        let compress_type = CompressType::from_u8(header[4]);
        let seq = u64::from_be_bytes(header[5..13].try_into().unwrap());

        let service_path = read_lp_string(reader).await?;
        let service_method = read_lp_string(reader).await?;

        let meta_count = read_u32(reader).await?;
        let mut metadata = Metadata::with_capacity(meta_count as usize);
        for _ in 0..meta_count {
            let k = read_lp_string(reader).await?;
            let v = read_lp_string(reader).await?;
            metadata.insert(k, v);
        }

        let payload_len = read_u32(reader).await?;
        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload).await?;
        if compress_type == CompressType::Gzip {
            payload = gzip_decompress(&payload)?;
        }

        Ok(Message {
            seq,
            message_type: if flags & FLAG_RESPONSE != 0 {
                MessageType::Response
            } else {
                MessageType::Request
            },
            status: if flags & FLAG_ERROR != 0 {
                MessageStatusType::Error
            } else {
                MessageStatusType::Normal
            },
            heartbeat: flags & FLAG_HEARTBEAT != 0,
            oneway: flags & FLAG_ONEWAY != 0,
            serialize_type,
            compress_type,
            service_path,
            service_method,
            metadata,
            payload,
        })
    }
}

async fn read_exact_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(io::Error::from(ErrorKind::UnexpectedEof));
            }
            return Err(io::Error::from(ErrorKind::UnexpectedEof));
        }
        filled += n;
    }
    Ok(())
}

async fn read_u32<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

async fn read_lp_string<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<String> {
    let len = read_u32(reader).await?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

fn write_lp_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn gzip_compress(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn gzip_decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Pooled message allocation. Message reuse matters on the hot decode path in
/// the original implementation; here the pool is a plain freelist behind a
/// mutex, kept deliberately simple rather than pulling in an object-pool crate.
static POOL: Mutex<Vec<Message>> = Mutex::new(Vec::new());

pub fn get_pooled_msg() -> Message {
    POOL.lock()
        .unwrap()
        .pop()
        .map(|mut msg| {
            msg.seq = 0;
            msg.message_type = MessageType::Request;
            msg.status = MessageStatusType::Normal;
            msg.heartbeat = false;
            msg.oneway = false;
            msg.service_path.clear();
            msg.service_method.clear();
            msg.metadata.clear();
            msg.payload.clear();
            msg
        })
        .unwrap_or_default()
}

pub fn free_msg(msg: Message) {
    let mut pool = POOL.lock().unwrap();
    if pool.len() < 256 {
        pool.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_encode_decode() {
        let mut msg = Message::new();
        msg.seq = 42;
        msg.service_path = "Echo".to_string();
        msg.service_method = "Say".to_string();
        msg.metadata.insert("k".to_string(), "v".to_string());
        msg.payload = b"hello".to_vec();

        let bytes = msg.encode();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Message::decode(&mut cursor).await.unwrap();

        assert_eq!(decoded.seq(), 42);
        assert_eq!(decoded.service_path, "Echo");
        assert_eq!(decoded.service_method, "Say");
        assert_eq!(decoded.metadata.get("k"), Some(&"v".to_string()));
        assert_eq!(decoded.payload, b"hello");
    }

    #[tokio::test]
    async fn round_trips_gzip_payload() {
        let mut msg = Message::new();
        msg.compress_type = CompressType::Gzip;
        msg.payload = vec![7u8; 4096];

        let bytes = msg.encode();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Message::decode(&mut cursor).await.unwrap();

        assert_eq!(decoded.payload, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn decode_reports_unexpected_eof_mid_frame() {
        let mut msg = Message::new();
        msg.payload = b"hello world".to_vec();
        let mut bytes = msg.encode();
        bytes.truncate(bytes.len() - 3);

        let mut cursor = std::io::Cursor::new(bytes);
        let err = Message::decode(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
