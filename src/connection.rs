//! Per-socket receive state
//!
//! A connection moves `ReceivingMetadata -> ReceivingBody` and is then closed.
//! The output file lives inside the `ReceivingBody` variant, so it is open
//! exactly while the body is being received.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::path::Path;

use mio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Result, Stage, TransferError};
use crate::protocol_core::{safe_file_name, MetadataDecoder};
use crate::uniquify::make_unique;

/// Output side of a connection that has parsed its metadata.
#[derive(Debug)]
pub struct ReceivedFile {
    pub file: File,
    /// Name the file was created under, after uniquification
    pub filename: String,
    pub size: u64,
    pub received: u64,
}

#[derive(Debug)]
pub enum Phase {
    ReceivingMetadata(MetadataDecoder),
    ReceivingBody(ReceivedFile),
}

/// Result of servicing a ready connection until it would block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing more to read right now; wait for the next readiness event
    Pending,
    /// Declared size reached; ready to finalize
    Complete,
}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    phase: Phase,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, metadata_width: usize) -> Self {
        Self {
            stream,
            peer,
            phase: Phase::ReceivingMetadata(MetadataDecoder::new(metadata_width)),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn filename(&self) -> Option<&str> {
        match &self.phase {
            Phase::ReceivingBody(out) => Some(&out.filename),
            Phase::ReceivingMetadata(_) => None,
        }
    }

    pub fn declared_size(&self) -> Option<u64> {
        match &self.phase {
            Phase::ReceivingBody(out) => Some(out.size),
            Phase::ReceivingMetadata(_) => None,
        }
    }

    pub fn received(&self) -> u64 {
        match &self.phase {
            Phase::ReceivingBody(out) => out.received,
            Phase::ReceivingMetadata(_) => 0,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Give up the socket and hand back the output file, if one was opened.
    pub fn into_output(self) -> Option<ReceivedFile> {
        match self.phase {
            Phase::ReceivingBody(out) => Some(out),
            Phase::ReceivingMetadata(_) => None,
        }
    }

    /// Service the socket until it would block, the transfer completes, or the
    /// peer goes away. `scratch` bounds the size of a single body read.
    ///
    /// A peer that closes before the declared size arrives is a
    /// [`TransferError::PrematureDisconnect`] in the [`Stage::Body`] stage.
    pub fn advance(&mut self, directory: &Path, scratch: &mut [u8]) -> Result<Step> {
        loop {
            match &mut self.phase {
                Phase::ReceivingMetadata(decoder) => {
                    let meta = match decoder.feed(&mut self.stream)? {
                        Some(meta) => meta,
                        None => return Ok(Step::Pending),
                    };
                    let requested = safe_file_name(&meta.filename)?;
                    let filename = make_unique(directory, &requested)?;
                    let file = File::create(directory.join(&filename))?;
                    info!(peer = %self.peer, file = %filename, size = meta.size, "Receiving");
                    self.phase = Phase::ReceivingBody(ReceivedFile {
                        file,
                        filename,
                        size: meta.size,
                        received: 0,
                    });
                }
                Phase::ReceivingBody(out) => {
                    if out.received >= out.size {
                        return Ok(Step::Complete);
                    }
                    let want = (out.size - out.received).min(scratch.len() as u64) as usize;
                    match self.stream.read(&mut scratch[..want]) {
                        Ok(0) => {
                            return Err(TransferError::PrematureDisconnect { stage: Stage::Body })
                        }
                        Ok(n) => {
                            out.file.write_all(&scratch[..n])?;
                            out.received += n as u64;
                            debug!(file = %out.filename, received = out.received, size = out.size, "chunk");
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Step::Pending),
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => return Err(TransferError::Io(e)),
                    }
                }
            }
        }
    }
}
