use std::fmt;
use std::io::{self, Write};

use bytes::BytesMut;
use flate2::write::GzDecoder;

use crate::DecodeError;

/// Start size for the [`Decoder`]'s target buffer.
///
/// The reservation will be smaller if the `Decoder`'s limit is set to a lower value. Likewise, the
/// buffer grows dynamically up to the limit as large payloads are being decompressed.
const DECODE_BUFFER_SIZE: usize = 8192;

/// A plain sink for chunks of binary data with a limit.
///
/// The sink will grow to the stated `limit` and then stop writing more data. When used in
/// combination with [`Write::write_all`], this will result in [`io::ErrorKind::WriteZero`] when
/// the sink overflows.
struct Sink<'a> {
    buffer: &'a mut BytesMut,
    remaining: usize,
    overflowed: bool,
}

impl<'a> Sink<'a> {
    fn new(buffer: &'a mut BytesMut, limit: usize) -> Self {
        let remaining = limit.saturating_sub(buffer.len());
        Self {
            buffer,
            remaining,
            overflowed: false,
        }
    }
}

impl Write for Sink<'_> {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            // This is the error that `Write::write_all` returns when we respond with `Ok(0)` from
            // this function. However, this is often not checked for `Write::flush`, which is why we
            // explicitly return an error here.
            self.overflowed = true;
            return Err(io::ErrorKind::WriteZero.into());
        }

        if buf.len() > self.remaining {
            buf = &buf[..self.remaining];
        }

        if self.buffer.is_empty() {
            self.buffer.reserve(DECODE_BUFFER_SIZE.min(self.remaining));
        }

        self.buffer.extend_from_slice(buf);
        self.remaining -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streaming gzip decoder writing into a caller-owned buffer.
///
/// Use [`decode`](Self::decode) to feed compressed chunks into the decoder as they arrive and
/// [`finish`](Self::finish) after the last chunk to validate the end of the stream. Decompressed
/// bytes are appended to the buffer passed to [`new`](Self::new).
///
/// When the decompressed payload reaches the size limit, decoding stops with
/// [`DecodeError::TooLarge`]. The buffer then contains the payload up to the limit.
pub struct Decoder<'a> {
    inner: GzDecoder<Sink<'a>>,
    limit: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a new `Decoder` appending to `buffer` with the given size limit.
    pub fn new(buffer: &'a mut BytesMut, limit: usize) -> Self {
        Self {
            inner: GzDecoder::new(Sink::new(buffer, limit)),
            limit,
        }
    }

    /// Decodes a chunk of compressed data.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        let result = self.inner.write_all(chunk).and_then(|()| self.inner.flush());
        self.check(result)
    }

    /// Completes decoding and returns the total number of decompressed bytes in the buffer.
    pub fn finish(mut self) -> Result<usize, DecodeError> {
        let result = self.inner.try_finish();
        self.check(result)?;
        Ok(self.inner.get_ref().buffer.len())
    }

    fn check(&self, result: io::Result<()>) -> Result<(), DecodeError> {
        match result {
            Ok(()) => Ok(()),
            Err(_) if self.inner.get_ref().overflowed => Err(DecodeError::TooLarge(self.limit)),
            Err(error) => Err(error.into()),
        }
    }
}

impl fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("limit", &self.limit)
            .field("remaining", &self.inner.get_ref().remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decoder_basic() {
        let mut buffer = BytesMut::new();
        let mut decoder = Decoder::new(&mut buffer, 10000);
        decoder.decode(b"\x1f\x8b\x08\x00\x06\xb4\x8ba\x00\x03\xcbH\xcd\xc9\xc9\xe7\x02\x00 0:6\x06\x00\x00\x00").unwrap();
        assert_eq!(decoder.finish().unwrap(), 6);
        assert_eq!(&buffer[..], b"hello\n");
    }

    #[test]
    fn test_decoder_chunked() {
        let data = b"FLR\0".repeat(1000);
        let compressed = gzip(&data);

        let mut buffer = BytesMut::new();
        let mut decoder = Decoder::new(&mut buffer, data.len());
        for chunk in compressed.chunks(7) {
            decoder.decode(chunk).unwrap();
        }
        assert_eq!(decoder.finish().unwrap(), data.len());
        assert_eq!(&buffer[..], &data[..]);
    }

    #[test]
    fn test_decoder_overflow() {
        let compressed = gzip(&[0; 4096]);

        let mut buffer = BytesMut::new();
        let mut decoder = Decoder::new(&mut buffer, 10);
        let error = decoder.decode(&compressed).unwrap_err();
        assert!(matches!(error, DecodeError::TooLarge(10)));

        drop(decoder);
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_decoder_invalid() {
        let mut buffer = BytesMut::new();
        let mut decoder = Decoder::new(&mut buffer, 10000);
        let error = decoder.decode(b"this is not gzip").unwrap_err();
        assert!(matches!(error, DecodeError::Io(_)));
    }
}
