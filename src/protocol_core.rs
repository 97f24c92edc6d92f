//! Metadata frame codec shared by the receive loop and the send client
//!
//! The frame is a fixed-width ASCII length prefix followed by a
//! `"<filename>/<filesize>"` payload. The body that follows is opaque and is
//! only counted, never decoded, so it has no codec of its own.

use crate::error::{Result, Stage, TransferError};
use crate::protocol::{MAX_METADATA_LEN, PAD, SEPARATOR};
use std::io::{ErrorKind, Read};
use std::path::{Component, Path};

/// Decoded metadata frame. `filename` is exactly what the peer sent and must
/// go through [`safe_file_name`] before it touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub filename: String,
    pub size: u64,
}

/// Build the complete metadata frame (prefix + payload) for a file.
pub fn encode_metadata(filename: &str, size: u64, width: usize) -> Result<Vec<u8>> {
    if filename.contains(SEPARATOR) {
        return Err(TransferError::protocol(format!(
            "filename {filename:?} contains the separator {SEPARATOR:?}"
        )));
    }
    if filename.contains('\0') {
        return Err(TransferError::protocol("filename contains NUL byte"));
    }
    let payload = format!("{filename}{SEPARATOR}{size}");
    if payload.len() > MAX_METADATA_LEN {
        return Err(TransferError::protocol(format!(
            "metadata payload too large: {} bytes (max: {})",
            payload.len(),
            MAX_METADATA_LEN
        )));
    }
    let mut frame = payload.len().to_string().into_bytes();
    if frame.len() > width {
        return Err(TransferError::protocol(format!(
            "payload length {} does not fit in a {width}-byte prefix",
            payload.len()
        )));
    }
    frame.resize(width, PAD);
    frame.extend_from_slice(payload.as_bytes());
    Ok(frame)
}

/// Parse the fixed-width length prefix into the payload length.
pub fn parse_length_prefix(prefix: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| TransferError::protocol("length prefix is not ASCII"))?;
    let len: usize = text
        .trim()
        .parse()
        .map_err(|_| TransferError::protocol(format!("bad length prefix {text:?}")))?;
    if len > MAX_METADATA_LEN {
        return Err(TransferError::protocol(format!(
            "metadata payload too large: {len} bytes (max: {MAX_METADATA_LEN})"
        )));
    }
    Ok(len)
}

/// Parse a `"<filename>/<filesize>"` payload, splitting on the first separator.
pub fn parse_payload(payload: &[u8]) -> Result<Metadata> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| TransferError::protocol("metadata payload is not valid UTF-8"))?;
    let (filename, size) = text.split_once(SEPARATOR).ok_or_else(|| {
        TransferError::protocol(format!("metadata payload {text:?} has no {SEPARATOR:?}"))
    })?;
    let size: u64 = size
        .trim()
        .parse()
        .map_err(|_| TransferError::protocol(format!("bad file size {size:?}")))?;
    Ok(Metadata {
        filename: filename.to_string(),
        size,
    })
}

/// Reduce a peer-supplied filename to a bare name that is safe to create
/// inside the target directory:
/// 1. Rejects empty names and names containing NUL
/// 2. Keeps only the final normal path component
/// 3. Rejects names that are nothing but `.`/`..`/root components
pub fn safe_file_name(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(TransferError::protocol("filename contains NUL byte"));
    }
    let name = Path::new(raw)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .last()
        .ok_or_else(|| TransferError::protocol(format!("unusable filename {raw:?}")))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Incremental decoder for one metadata frame.
///
/// Accumulates partial reads across readiness events and never reads past
/// the end of the payload, so body bytes stay queued in the socket.
#[derive(Debug)]
pub struct MetadataDecoder {
    width: usize,
    buf: Vec<u8>,
    payload_len: Option<usize>,
}

impl MetadataDecoder {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            buf: Vec::with_capacity(width),
            payload_len: None,
        }
    }

    /// Bytes buffered towards the part of the frame currently being read
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn stage(&self) -> Stage {
        match self.payload_len {
            None => Stage::LengthPrefix,
            Some(_) => Stage::Payload,
        }
    }

    fn wanted(&self) -> usize {
        self.payload_len.unwrap_or(self.width)
    }

    /// Pull as much of the frame as `src` has to offer.
    ///
    /// Returns `Ok(None)` when `src` would block before the frame is complete,
    /// `Ok(Some(..))` once the whole frame has been read.
    pub fn feed<R: Read>(&mut self, src: &mut R) -> Result<Option<Metadata>> {
        loop {
            let want = self.wanted();
            let have = self.buf.len();
            if have < want {
                self.buf.resize(want, 0);
                let read = src.read(&mut self.buf[have..]);
                match read {
                    Ok(0) => {
                        self.buf.truncate(have);
                        return Err(TransferError::PrematureDisconnect {
                            stage: self.stage(),
                        });
                    }
                    Ok(n) => {
                        self.buf.truncate(have + n);
                        continue;
                    }
                    Err(e) => {
                        self.buf.truncate(have);
                        match e.kind() {
                            ErrorKind::WouldBlock => return Ok(None),
                            ErrorKind::Interrupted => continue,
                            _ => return Err(e.into()),
                        }
                    }
                }
            }

            match self.payload_len {
                None => {
                    self.payload_len = Some(parse_length_prefix(&self.buf)?);
                    self.buf.clear();
                }
                Some(_) => return parse_payload(&self.buf).map(Some),
            }
        }
    }
}

/// Blocking decode of one metadata frame from `src`.
pub fn decode_metadata<R: Read>(src: &mut R, width: usize) -> Result<Metadata> {
    let mut decoder = MetadataDecoder::new(width);
    match decoder.feed(src)? {
        Some(meta) => Ok(meta),
        None => Err(TransferError::Io(ErrorKind::WouldBlock.into())),
    }
}
