//! Streaming thumbnail pipeline.
//!
//! Turns a live source byte stream into a resized JPEG stream. The source
//! is bridged into a blocking stage that consumes chunks as they arrive,
//! decodes, resizes to the target width, and re-encodes; output leaves
//! through a bounded channel in fixed-size frames. Backpressure from the
//! HTTP connection stalls the channel, which stalls the encoder, which (via
//! the bridge) stops pulling from the source. Output is always JPEG at a
//! fixed quality so results are a pure function of (file id, width) and can
//! be cached aggressively downstream.
//!
//! The decoders want seekable input, so compressed bytes are buffered as
//! the decoder pulls them, up to a hard cap; a source that fails format
//! detection is abandoned after a small prefix. Memory is bounded by that
//! cap plus one decoded frame, never by output buffering.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use futures::Stream;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Width used when the caller does not specify one.
pub const DEFAULT_WIDTH: u32 = 600;
/// Upper bound accepted from callers.
pub const MAX_WIDTH: u32 = 4096;
/// Mime type of every transformed stream.
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

const JPEG_QUALITY: u8 = 80;
const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 4;
/// Hard cap on buffered compressed input.
const MAX_INPUT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode or encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("source stream failed: {0}")]
    Source(#[from] io::Error),
}

/// Start the transform for one source stream.
///
/// Returns the receiving end of the output channel. The first received item
/// decides the response: an `Err` before any bytes means the caller can
/// still surface a server error; an `Err` after output has started simply
/// ends the stream (a half-written image is the accepted degraded outcome).
/// Dropping the receiver aborts the pipeline promptly, including the
/// upstream read.
pub fn transform<S>(source: S, width: u32) -> mpsc::Receiver<Result<Bytes, TransformError>>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let bridge = SyncIoBridge::new(StreamReader::new(source));

    tokio::task::spawn_blocking(move || {
        if let Err(e) = run(bridge, width, &tx) {
            // Receiver may already be gone; then there is nobody to tell.
            let _ = tx.blocking_send(Err(e));
        }
    });

    rx
}

fn run<R: Read>(
    source: R,
    width: u32,
    tx: &mpsc::Sender<Result<Bytes, TransformError>>,
) -> Result<(), TransformError> {
    let input = InputReader::new(source, tx, MAX_INPUT_BYTES);
    let img = ImageReader::new(input).with_guessed_format()?.decode()?;
    let resized = if img.width() == width {
        img
    } else {
        // Height follows from the aspect ratio; u32::MAX leaves the width
        // bound in charge. Narrower sources are scaled up so the output
        // width is always the requested one.
        img.resize(width, u32::MAX, FilterType::Lanczos3)
    };
    // JPEG has no alpha channel.
    let resized = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut writer = ChunkWriter::new(tx);
    resized.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?;
    writer.flush()?;
    Ok(())
}

/// Seekable view over the source, filled only on decoder demand.
///
/// The decoder pulls compressed bytes as it makes progress, so an input
/// that fails format detection leaves the rest of the source unread and a
/// slow decode paces the inbound reads. Fetched bytes are retained to
/// satisfy the decoder's seeks, capped at `max_bytes`.
struct InputReader<'a, R> {
    source: R,
    tx: &'a mpsc::Sender<Result<Bytes, TransformError>>,
    buf: Vec<u8>,
    pos: u64,
    eof: bool,
    max_bytes: usize,
}

impl<'a, R: Read> InputReader<'a, R> {
    fn new(source: R, tx: &'a mpsc::Sender<Result<Bytes, TransformError>>, max_bytes: usize) -> Self {
        Self {
            source,
            tx,
            buf: Vec::new(),
            pos: 0,
            eof: false,
            max_bytes,
        }
    }

    /// Pull from the source until `target` bytes are buffered or it ends.
    fn fetch(&mut self, target: usize) -> io::Result<()> {
        while !self.eof && self.buf.len() < target {
            if self.tx.is_closed() {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "thumbnail consumer disconnected",
                ));
            }
            if self.buf.len() >= self.max_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "source image exceeds input size limit",
                ));
            }
            let old = self.buf.len();
            self.buf.resize(old + CHUNK_SIZE, 0);
            let n = self.source.read(&mut self.buf[old..])?;
            self.buf.truncate(old + n);
            if n == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    fn fetch_all(&mut self) -> io::Result<()> {
        while !self.eof {
            let target = self.buf.len() + CHUNK_SIZE;
            self.fetch(target)?;
        }
        Ok(())
    }
}

impl<R: Read> Read for InputReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for InputReader<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let pos = self.pos as usize;
        if pos >= self.buf.len() {
            self.fetch(pos + 1)?;
        }
        let start = pos.min(self.buf.len());
        Ok(&self.buf[start..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt as u64;
    }
}

impl<R: Read> Seek for InputReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => {
                // Only reachable for decoders that need the input length.
                self.fetch_all()?;
                self.buf.len() as i64 + delta
            }
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of input",
            ));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

/// `Write` adapter slicing encoder output into channel frames.
struct ChunkWriter<'a> {
    tx: &'a mpsc::Sender<Result<Bytes, TransformError>>,
    buf: Vec<u8>,
}

impl<'a> ChunkWriter<'a> {
    fn new(tx: &'a mpsc::Sender<Result<Bytes, TransformError>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send(&self, chunk: Vec<u8>) -> io::Result<()> {
        self.tx.blocking_send(Ok(Bytes::from(chunk))).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "thumbnail consumer disconnected",
            )
        })
    }
}

impl Write for ChunkWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= CHUNK_SIZE {
            let rest = self.buf.split_off(CHUNK_SIZE);
            let chunk = std::mem::replace(&mut self.buf, rest);
            self.send(chunk)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let chunk = std::mem::take(&mut self.buf);
            self.send(chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([200, 40, 40]);
        }
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn source_stream(
        data: Vec<u8>,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + Unpin + 'static {
        // Split into several frames so the pipeline sees a real stream.
        let chunks: Vec<Result<Bytes, io::Error>> = data
            .chunks(512)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures::stream::iter(chunks)
    }

    async fn collect_output(
        mut rx: mpsc::Receiver<Result<Bytes, TransformError>>,
    ) -> Result<Vec<u8>, TransformError> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.extend_from_slice(&item?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_resizes_to_requested_width_preserving_aspect() {
        let rx = transform(source_stream(png_bytes(64, 48)), 300);
        let out = collect_output(rx).await.unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.width(), 300);
        assert_eq!(decoded.height(), 225);
    }

    #[tokio::test]
    async fn test_output_is_jpeg_regardless_of_source_format() {
        let rx = transform(source_stream(png_bytes(32, 32)), 32);
        let out = collect_output(rx).await.unwrap();

        assert_eq!(
            image::guess_format(&out).unwrap(),
            ImageFormat::Jpeg,
            "expected JPEG output from PNG source"
        );
    }

    #[tokio::test]
    async fn test_same_input_yields_identical_output() {
        let data = png_bytes(64, 48);
        let first = collect_output(transform(source_stream(data.clone()), 300))
            .await
            .unwrap();
        let second = collect_output(transform(source_stream(data), 300))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_corrupt_source_errors_before_any_output() {
        let garbage = vec![0x13u8; 4096];
        let mut rx = transform(source_stream(garbage), 300);

        match rx.recv().await {
            Some(Err(TransformError::Image(_))) => {}
            other => panic!("expected decode error as first item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        // Valid PNG signature so the decoder commits, then the source dies.
        let failing = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"\x89PNG\r\n\x1a\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream died")),
        ]);
        let mut rx = transform(failing, 300);

        match rx.recv().await {
            Some(Err(_)) => {}
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_source_is_abandoned_after_a_prefix() {
        use futures::StreamExt;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let chunks: Vec<Result<Bytes, io::Error>> = (0..256)
            .map(|_| Ok(Bytes::from(vec![0x5Au8; 16 * 1024])))
            .collect();
        let source = futures::stream::iter(chunks).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Hold the receiver without ever polling it: with zero downstream
        // demand the pipeline must not drain the source.
        let _rx = transform(source, 300);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let n = pulled.load(Ordering::SeqCst);
        assert!(
            n < 8,
            "format sniffing should stop after a prefix, pulled {n} chunks"
        );
    }

    #[test]
    fn test_input_cap_stops_oversized_sources() {
        let (tx, _rx) = mpsc::channel(1);
        let mut reader = InputReader::new(io::repeat(0x42), &tx, 4 * CHUNK_SIZE);

        let mut sink = Vec::new();
        let err = reader.read_to_end(&mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_pipeline() {
        let rx = transform(source_stream(png_bytes(64, 48)), 300);
        drop(rx);
        // Nothing to assert directly; the blocking stage must notice the
        // closed channel and bail instead of hanging. Give it a moment.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
