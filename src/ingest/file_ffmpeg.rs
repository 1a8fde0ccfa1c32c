//! Local video file decoding using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to RGB24. A packet stream that runs dry is
//! the end of the video; decoder errors are surfaced as read failures.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use super::FrameSource;
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
    frame_count: u64,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: &FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: decoding {} ({}x{}, ffmpeg)",
            config.path,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path: config.path.clone(),
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
            frame_count: 0,
        })
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(err) if decoder_drained(&err) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to decode frame from {}", self.path))
            }
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.frame_count += 1;
        Ok(Some(Frame::new(pixels, width, height)?))
    }
}

impl FrameSource for FfmpegFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }

        while let Some((stream, packet)) = self.input.packets().next() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        // Drain frames still buffered in the decoder.
        if !self.eof_sent {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.eof_sent = true;
        }
        self.receive()
    }

    fn close(&mut self) -> Result<()> {
        log::debug!(
            "FileSource: {} decoded {} frames",
            self.path,
            self.frame_count
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (ffmpeg)", self.path)
    }
}

/// The decoder wants more input (EAGAIN) or has been fully flushed (EOF).
fn decoder_drained(err: &ffmpeg::Error) -> bool {
    match err {
        ffmpeg::Error::Eof => true,
        ffmpeg::Error::Other { errno } => *errno == ffmpeg::util::error::EAGAIN,
        _ => false,
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_eagain_and_eof_mean_drained() {
        assert!(decoder_drained(&ffmpeg::Error::Eof));
        assert!(decoder_drained(&ffmpeg::Error::Other {
            errno: ffmpeg::util::error::EAGAIN
        }));
        assert!(!decoder_drained(&ffmpeg::Error::InvalidData));
        assert!(!decoder_drained(&ffmpeg::Error::Other {
            errno: ffmpeg::util::error::EINVAL
        }));
    }
}
