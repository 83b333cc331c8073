//! Content-coding round trip for rewritten bodies

use std::io::{self, Read, Write};

use axum::http::HeaderValue;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;

/// Coding of a body as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Identity,
    Gzip,
    /// `deflate` as specified: zlib framing
    Zlib,
    /// `deflate` as some servers send it: bare deflate stream
    RawDeflate,
}

impl Coding {
    /// The `Content-Encoding` header value, if any
    pub fn header_value(&self) -> Option<HeaderValue> {
        match self {
            Coding::Identity => None,
            Coding::Gzip => Some(HeaderValue::from_static("gzip")),
            Coding::Zlib | Coding::RawDeflate => Some(HeaderValue::from_static("deflate")),
        }
    }
}

/// Decode `body` according to its `Content-Encoding` header
///
/// Returns the plain bytes and the exact coding that produced them.
pub fn decode(body: &[u8], content_encoding: Option<&HeaderValue>) -> io::Result<(Vec<u8>, Coding)> {
    let coding = content_encoding
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match coding.as_str() {
        "" | "identity" => Ok((body.to_vec(), Coding::Identity)),
        "gzip" | "x-gzip" => read_all(GzDecoder::new(body)).map(|b| (b, Coding::Gzip)),
        "deflate" => match read_all(ZlibDecoder::new(body)) {
            Ok(b) => Ok((b, Coding::Zlib)),
            Err(_) => read_all(DeflateDecoder::new(body)).map(|b| (b, Coding::RawDeflate)),
        },
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported content-encoding: {}", other),
        )),
    }
}

/// Encode `body` with `coding`
pub fn encode(body: &[u8], coding: Coding) -> io::Result<Vec<u8>> {
    match coding {
        Coding::Identity => Ok(body.to_vec()),
        Coding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()
        }
        Coding::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()
        }
        Coding::RawDeflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()
        }
    }
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
