use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{decode_raw_frame, incomplete, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};
use crate::frame::Cd11Frame;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally: callers always get whole frames, and the
/// stream is left on the next frame boundary.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF at a frame boundary
    /// and `Err(FrameError::IncompleteFrame)` on EOF inside a frame.
    pub fn read_frame(&mut self) -> Result<RawFrame> {
        self.read_frame_until(|| false)
    }

    /// Read the next complete frame, giving up when `should_abort` returns true.
    ///
    /// `should_abort` is checked before every read attempt. Reads that time out
    /// or would block count as an idle tick and are retried, so a socket read
    /// timeout sets how often the predicate is polled. Returns
    /// `Err(FrameError::Timeout)` once aborted; buffered bytes are kept, so a
    /// later call resumes the same frame.
    pub fn read_frame_until(&mut self, mut should_abort: impl FnMut() -> bool) -> Result<RawFrame> {
        loop {
            if let Some(frame) = decode_raw_frame(&mut self.buf, self.config.max_frame_size)? {
                return Ok(frame);
            }

            if should_abort() {
                return Err(FrameError::Timeout);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(incomplete(&self.buf, self.config.max_frame_size));
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read and decode the next frame.
    ///
    /// A decode failure consumes the frame, so the next call starts on the
    /// following frame.
    pub fn read_cd11_frame(&mut self) -> Result<Cd11Frame> {
        let raw = self.read_frame()?;
        Cd11Frame::decode(&raw)
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent decoding.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TcpStream> {
    /// Create a frame reader for a `TcpStream` and apply the read timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::{BufMut, Bytes};

    use super::*;
    use crate::factory::FrameFactory;
    use crate::frame::FrameBody;
    use crate::header::{FrameType, HEADER_SIZE};

    fn alert_bytes(message: &str) -> Bytes {
        FrameFactory::new().alert(message).unwrap().to_bytes().unwrap()
    }

    fn wire(messages: &[&str]) -> Vec<u8> {
        messages.iter().flat_map(|m| alert_bytes(m).to_vec()).collect()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&["hello"])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.frame_type(), FrameType::Alert);
        assert_eq!(frame.bytes, alert_bytes("hello"));
        assert!(frame.verify_crc());
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&["one", "two", "three"])));

        for expected in ["one", "two", "three"] {
            let frame = reader.read_cd11_frame().unwrap();
            match frame.body {
                FrameBody::Alert(alert) => assert_eq!(alert.message, expected),
                other => panic!("unexpected body {other:?}"),
            }
        }
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_frame_with_large_body() {
        let message = "x".repeat(64 * 1024);
        let mut reader = FrameReader::new(Cursor::new(wire(&[&message])));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.body.len(), 4 + message.len());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&["slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.bytes, alert_bytes("slow"));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame_is_incomplete() {
        let full = alert_bytes("only-part");
        let mut reader = FrameReader::new(Cursor::new(full[..HEADER_SIZE + 6].to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteFrame { received, .. } if received == HEADER_SIZE + 6
        ));
    }

    #[test]
    fn corrupt_trailer_offset_in_stream() {
        let mut bytes = alert_bytes("bad").to_vec();
        bytes[4..8].copy_from_slice(&(-1i32).to_be_bytes());
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::InvalidHeader(_)));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_i32(5);
        wire.put_i32(1024);
        wire.put_bytes(0, HEADER_SIZE - 8);

        let cfg = FrameConfig {
            max_frame_size: 64,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn malformed_body_leaves_stream_on_next_frame() {
        let mut bad = alert_bytes("zz").to_vec();
        // Alert size field claims more bytes than the body holds.
        bad[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&100i32.to_be_bytes());
        let mut stream = bad;
        stream.extend_from_slice(&alert_bytes("next"));

        let mut reader = FrameReader::new(Cursor::new(stream));
        let err = reader.read_cd11_frame().unwrap_err();
        assert!(err.is_recoverable());

        let frame = reader.read_cd11_frame().unwrap();
        assert!(matches!(frame.body, FrameBody::Alert(a) if a.message == "next"));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            if buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer
            .write_frame(&FrameFactory::new().alert("ping").unwrap())
            .unwrap();
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.bytes, alert_bytes("ping"));
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u64 {
                let frame = reader.read_frame().unwrap();
                assert_eq!(frame.header.sequence_number, expected);
            }
        });

        let factory = FrameFactory::new();
        for seq in 0..64u64 {
            let ts = chrono::DateTime::from_timestamp(1_500_000_000 + seq as i64, 0).unwrap();
            let subframe =
                crate::subframe::ChannelSubframe::new("STA", "BHZ", "", ts, 1000, 40, &b"w"[..]);
            writer
                .write_frame(&factory.data(vec![subframe], seq).unwrap())
                .unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.buffered(), 0);
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_is_retried() {
        let reader = WouldBlockThenData {
            state: 0,
            bytes: wire(&["ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.bytes, alert_bytes("ok"));
    }

    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&["ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.bytes, alert_bytes("ok"));
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn abort_predicate_unblocks_silent_stream() {
        let (_left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        right
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let mut reader = FrameReader::new(right);

        let mut polls = 0;
        let err = reader
            .read_frame_until(|| {
                polls += 1;
                polls > 3
            })
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
        assert_eq!(polls, 4);
    }

    #[test]
    fn abort_mid_frame_keeps_partial_bytes() {
        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        right
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let mut reader = FrameReader::new(right);

        let full = alert_bytes("split");
        std::io::Write::write_all(&mut left, &full[..20]).unwrap();

        let mut ticks = 0;
        let err = reader
            .read_frame_until(|| {
                ticks += 1;
                ticks >= 3
            })
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
        assert_eq!(reader.buffered(), 20);

        std::io::Write::write_all(&mut left, &full[20..]).unwrap();
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.bytes, full);
    }

    #[test]
    fn applies_read_timeout_for_tcp_stream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (stream, _) = listener.accept().unwrap();
        let _client = client.join().unwrap();

        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let reader = FrameReader::with_config_tcp(stream, cfg).unwrap();
        assert_eq!(
            reader.get_ref().read_timeout().unwrap(),
            Some(Duration::from_millis(10))
        );
    }
}
