//! MJPEG demultiplexing
//!
//! The upstream body is treated as a plain concatenation of JPEG images. A
//! frame is everything from a start-of-image marker (`FF D8`) through the next
//! end-of-image marker (`FF D9`) inclusive. Any multipart boundaries or
//! headers the camera interleaves are skipped as junk between frames.
//!
//! The accumulation buffer is bounded: once an unterminated frame pushes it
//! past the ceiling, only the newest tail is kept. A corrupt or oversized
//! frame is lost rather than growing memory without bound.

use bytes::{Buf, Bytes, BytesMut};

/// JPEG start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// Incremental SOI/EOI frame splitter
#[derive(Debug)]
pub struct MjpegDemuxer {
    /// Undecoded bytes carried between chunks
    buffer: BytesMut,
    /// Ceiling for `buffer` after each push
    max_size: usize,
    /// Tail kept when the ceiling is exceeded
    trim_size: usize,
    /// Offset from which to resume the EOI search (SOI is at offset 0 when set)
    scan_from: usize,
    /// Number of times the buffer has been trimmed
    trims: u64,
}

impl MjpegDemuxer {
    /// Create a demuxer with the given buffer ceiling and trim tail
    pub fn new(max_size: usize, trim_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_size,
            trim_size: trim_size.min(max_size),
            scan_from: 0,
            trims: 0,
        }
    }

    /// Append a chunk and return every frame it completes, oldest first
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(start) = find_marker(&self.buffer, SOI) else {
                // Nothing here can become a frame except a dangling 0xFF
                let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
                let junk = self.buffer.len() - keep;
                self.discard(junk);
                break;
            };
            if start > 0 {
                self.discard(start);
            }

            let from = self.scan_from.max(SOI.len());
            match find_marker(&self.buffer[from..], EOI) {
                Some(offset) => {
                    let end = from + offset + EOI.len();
                    frames.push(self.buffer.split_to(end).freeze());
                    self.scan_from = 0;
                }
                None => {
                    // The last byte may be the first half of EOI
                    self.scan_from = (self.buffer.len() - 1).max(SOI.len());
                    break;
                }
            }
        }

        if self.buffer.len() > self.max_size {
            let excess = self.buffer.len() - self.trim_size;
            self.discard(excess);
            self.scan_from = 0;
            self.trims += 1;
            tracing::debug!(
                kept = self.buffer.len(),
                dropped = excess,
                "Parse buffer exceeded ceiling, trimmed to tail"
            );
        }

        frames
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// How many times the buffer was trimmed
    pub fn trims(&self) -> u64 {
        self.trims
    }

    fn discard(&mut self, n: usize) {
        self.buffer.advance(n);
        self.scan_from = self.scan_from.saturating_sub(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::jpeg;

    fn demuxer() -> MjpegDemuxer {
        MjpegDemuxer::new(4 * 1024 * 1024, 1024 * 1024)
    }

    #[test]
    fn test_single_frame() {
        let mut demux = demuxer();
        let image = jpeg(1, 64);

        let frames = demux.push(&image);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), image.as_slice());
        assert_eq!(demux.buffered(), 0);
    }

    #[test]
    fn test_minimal_frame() {
        let mut demux = demuxer();

        let frames = demux.push(&[0xFF, 0xD8, 0xFF, 0xD9]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut demux = demuxer();
        let image = jpeg(2, 100);

        assert!(demux.push(&image[..40]).is_empty());
        assert!(demux.push(&image[40..99]).is_empty());
        let frames = demux.push(&image[99..]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), image.as_slice());
    }

    #[test]
    fn test_marker_split_between_chunks() {
        let mut demux = demuxer();
        let image = jpeg(3, 10);
        let split = image.len() - 1; // FF | D9

        assert!(demux.push(&image[..1]).is_empty()); // FF | D8
        assert!(demux.push(&image[1..split]).is_empty());
        let frames = demux.push(&image[split..]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), image.as_slice());
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut demux = demuxer();
        let images: Vec<Vec<u8>> = (0..3).map(|i| jpeg(i, 20 + i as usize)).collect();
        let stream: Vec<u8> = images.concat();

        let frames = demux.push(&stream);

        assert_eq!(frames.len(), 3);
        for (frame, image) in frames.iter().zip(&images) {
            assert_eq!(frame.as_ref(), image.as_slice());
        }
    }

    #[test]
    fn test_multipart_headers_are_skipped() {
        let mut demux = demuxer();
        let image = jpeg(4, 32);
        let mut stream = Vec::new();
        stream.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        stream.extend_from_slice(&image);
        stream.extend_from_slice(b"\r\n--frame\r\n");

        let frames = demux.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), image.as_slice());
        // Trailing junk without a start marker is not retained
        assert_eq!(demux.buffered(), 0);
    }

    #[test]
    fn test_round_trip_arbitrary_chunking() {
        let images: Vec<Vec<u8>> = (0..25).map(|i| jpeg(i, 50 + 7 * i as usize)).collect();
        let stream: Vec<u8> = images.concat();

        for chunk_size in [1, 2, 3, 7, 64, 4096] {
            let mut demux = demuxer();
            let frames: Vec<Bytes> = stream
                .chunks(chunk_size)
                .flat_map(|chunk| demux.push(chunk))
                .collect();

            assert_eq!(frames.len(), images.len(), "chunk size {}", chunk_size);
            for (frame, image) in frames.iter().zip(&images) {
                assert_eq!(frame.as_ref(), image.as_slice());
            }
        }
    }

    #[test]
    fn test_unterminated_frame_bounded_by_ceiling() {
        let mut demux = MjpegDemuxer::new(1024, 256);
        demux.push(&SOI);

        for _ in 0..100 {
            let frames = demux.push(&[0x11; 100]);
            assert!(frames.is_empty());
            assert!(demux.buffered() <= 1024);
        }
        assert!(demux.trims() > 0);
    }

    #[test]
    fn test_recovers_after_trim() {
        let mut demux = MjpegDemuxer::new(1024, 256);
        demux.push(&SOI);
        demux.push(&[0x22; 2000]);
        assert!(demux.buffered() <= 1024);

        let image = jpeg(5, 40);
        let frames = demux.push(&image);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), image.as_slice());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut demux = demuxer();
        let image = jpeg(6, 30);
        demux.push(&image[..10]);

        demux.reset();
        assert_eq!(demux.buffered(), 0);

        // Tail of the old frame has no start marker and is discarded
        assert!(demux.push(&image[10..]).is_empty());
        let frames = demux.push(&image);
        assert_eq!(frames.len(), 1);
    }
}
