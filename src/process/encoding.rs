// src/process/encoding.rs

use encoding_rs::{Decoder, DecoderResult, Encoding};
use std::io::{self, Read};

const RAW_BUF_SIZE: usize = 64 * 1024;

/// `Read` adapter that transcodes a single-byte (or any encoding_rs) stream
/// to UTF-8 on the fly, so the CSV reader never sees the whole file.
///
/// A leading UTF-8 or UTF-16 byte order mark is stripped and switches the
/// decoder to that encoding. Malformed input is reported as `InvalidData`
/// instead of being replaced.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    raw: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder(),
            raw: vec![0; RAW_BUF_SIZE],
            out: Vec::new(),
            out_pos: 0,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let n = self.inner.read(&mut self.raw)?;
        let last = n == 0;

        let capacity = self
            .decoder
            .max_utf8_buffer_length_without_replacement(n)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "decode buffer overflow"))?;
        self.out.clear();
        self.out.resize(capacity, 0);
        self.out_pos = 0;

        let (result, read, written) =
            self.decoder
                .decode_to_utf8_without_replacement(&self.raw[..n], &mut self.out, last);
        match result {
            DecoderResult::InputEmpty => {}
            DecoderResult::Malformed(_, _) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "malformed {} input",
                        self.decoder.encoding().name()
                    ),
                ));
            }
            DecoderResult::OutputFull => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("decoder stalled after {} of {} bytes", read, n),
                ));
            }
        }
        self.out.truncate(written);
        if last {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_pos < self.out.len() {
                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}
