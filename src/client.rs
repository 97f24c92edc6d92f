//! Blocking send client: one connection, one file

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::progress::TransferProgress;
use crate::protocol::defaults;
use crate::protocol_core::encode_metadata;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub metadata_width: usize,
    pub chunk_size: usize,
    pub quiet: bool,
    /// How long to wait for the server to close after the body is sent;
    /// `None` waits indefinitely
    pub close_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            metadata_width: defaults::METADATA_WIDTH,
            chunk_size: defaults::CHUNK_SIZE,
            quiet: true,
            close_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendReport {
    pub filename: String,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Send `path` to the server at `host:port`.
///
/// The metadata carries the file's base name and its size at open time;
/// exactly that many body bytes follow. Success is only reported once the
/// server has closed the connection, which it does after the file is saved.
pub fn send_file(path: &Path, host: &str, port: u16, opts: &ClientOptions) -> Result<SendReport> {
    let meta = fs::metadata(path)
        .with_context(|| format!("File {} does not exist", path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("unusable file name: {}", path.display()))?;
    let size = meta.len();
    let frame = encode_metadata(filename, size, opts.metadata_width)?;

    let start = Instant::now();
    let mut stream = TcpStream::connect((host, port))
        .with_context(|| format!("connect {}:{}", host, port))?;
    stream.set_nodelay(true).context("set TCP_NODELAY")?;
    stream.write_all(&frame).context("send metadata")?;
    info!(file = filename, size, "File metadata sent to server");

    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let progress = TransferProgress::new(filename, size, opts.quiet);
    let sent = stream_body(&mut file, &mut stream, size, opts.chunk_size, &progress)
        .and_then(|sent| {
            debug!(file = filename, bytes = sent, "Body sent, waiting for server to close");
            await_close(&mut stream, opts.close_timeout)?;
            Ok(sent)
        });
    match sent {
        Ok(sent) => {
            progress.finish_success(sent);
            info!(file = filename, bytes = sent, "File sent to server");
            Ok(SendReport {
                filename: filename.to_string(),
                bytes_sent: sent,
                elapsed: start.elapsed(),
            })
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            Err(e)
        }
    }
}

fn stream_body<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    size: u64,
    chunk_size: usize,
    progress: &TransferProgress,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    while sent < size {
        let want = (size - sent).min(buf.len() as u64) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            bail!("file shrank while sending ({} of {} bytes)", sent, size);
        }
        dst.write_all(&buf[..n]).context("send file body")?;
        sent += n as u64;
        progress.advance(n as u64);
    }
    dst.flush()?;
    Ok(sent)
}

/// Half-close the write side and block until the server closes its end.
///
/// The server never writes, so any byte received is a protocol violation and
/// a reset means the transfer was not accepted.
fn await_close(stream: &mut TcpStream, timeout: Option<Duration>) -> Result<()> {
    stream.shutdown(Shutdown::Write).context("half-close after body")?;
    stream.set_read_timeout(timeout).context("set close timeout")?;
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => bail!("server sent {} unexpected bytes", n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                let waited = timeout.unwrap_or_default();
                bail!("server did not close the connection within {:?}", waited)
            }
            Err(e) => return Err(e).context("waiting for server to close the connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    fn source_file(tmp: &TempDir, size: usize) -> std::path::PathBuf {
        let path = tmp.path().join("payload.bin");
        std::fs::write(&path, vec![0x5au8; size]).unwrap();
        path
    }

    #[test]
    fn test_stream_body_stops_at_declared_size() {
        let mut src = Cursor::new(vec![7u8; 100]);
        let mut dst = Vec::new();
        let progress = TransferProgress::new("x", 60, true);
        let sent = stream_body(&mut src, &mut dst, 60, 16, &progress).unwrap();
        assert_eq!(sent, 60);
        assert_eq!(dst.len(), 60);
        assert_eq!(progress.position(), 60);
    }

    #[test]
    fn test_stream_body_detects_short_source() {
        let mut src = Cursor::new(vec![1u8; 10]);
        let mut dst = Vec::new();
        let progress = TransferProgress::new("x", 20, true);
        assert!(stream_body(&mut src, &mut dst, 20, 8, &progress).is_err());
    }

    #[test]
    fn test_missing_file_and_directory_rejected() {
        let tmp = TempDir::new().unwrap();
        let opts = ClientOptions::default();
        assert!(send_file(&tmp.path().join("nope.bin"), "127.0.0.1", 1, &opts).is_err());
        assert!(send_file(tmp.path(), "127.0.0.1", 1, &opts).is_err());
    }

    #[test]
    fn test_success_waits_for_server_close() {
        let tmp = TempDir::new().unwrap();
        let path = source_file(&tmp, 1000);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = Duration::from_millis(300);

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            sock.read_to_end(&mut received).unwrap();
            thread::sleep(hold);
            received.len()
        });

        let start = Instant::now();
        let report = send_file(&path, "127.0.0.1", port, &ClientOptions::default()).unwrap();
        assert!(start.elapsed() >= hold, "returned after {:?}", start.elapsed());
        assert_eq!(report.bytes_sent, 1000);
        let frame_len = defaults::METADATA_WIDTH + "payload.bin/1000".len();
        assert_eq!(server.join().unwrap(), frame_len + 1000);
    }

    #[test]
    fn test_peer_that_never_closes_is_not_success() {
        let tmp = TempDir::new().unwrap();
        let path = source_file(&tmp, 1000);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        // accepts, never reads, keeps the socket open until the test is done
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            let _ = done_rx.recv_timeout(Duration::from_secs(3));
            drop(sock);
        });

        let opts = ClientOptions {
            close_timeout: Some(Duration::from_millis(200)),
            ..ClientOptions::default()
        };
        let result = send_file(&path, "127.0.0.1", port, &opts);
        done_tx.send(()).unwrap();
        server.join().unwrap();
        assert!(result.is_err(), "reported success while the server still held the connection");
    }

    #[test]
    fn test_reply_bytes_are_a_failure() {
        let tmp = TempDir::new().unwrap();
        let path = source_file(&tmp, 10);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            sock.read_to_end(&mut received).unwrap();
            sock.write_all(b"?").unwrap();
        });

        let err = send_file(&path, "127.0.0.1", port, &ClientOptions::default()).unwrap_err();
        server.join().unwrap();
        assert!(err.to_string().contains("unexpected"), "{err}");
    }
}
