//! Local file frame source.
//!
//! `FileSource` picks a backend from the configured path:
//! - `stub://<name>`: synthetic road scene
//! - an existing directory: image sequence
//! - a video file with a supported extension: FFmpeg decoder (feature: ingest-file-ffmpeg)
//!
//! The file source MUST NOT fetch remote URLs.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::images::{has_extension, ImageSequenceSource};
use super::synthetic::{SyntheticScene, SYNTHETIC_FRAMES};
use super::FrameSource;
use crate::frame::Frame;

/// Video containers accepted for decoding.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file or directory path (e.g., "/var/lib/traffic/cam1.mp4"), or `stub://name`.
    pub path: String,
    /// Stop after this many frames. Synthetic scenes default to a single vehicle pass.
    pub max_frames: Option<u64>,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_frames: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    config: FileConfig,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticScene),
    Images(ImageSequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }

        let backend = if config.path.starts_with("stub://") {
            let frames = config.max_frames.unwrap_or(SYNTHETIC_FRAMES);
            FileBackend::Synthetic(SyntheticScene::new(&config.path, frames))
        } else {
            let path = Path::new(&config.path);
            if path.is_dir() {
                FileBackend::Images(ImageSequenceSource::open(path)?)
            } else {
                if !path.exists() {
                    return Err(anyhow!("video file {} does not exist", config.path));
                }
                if !has_extension(path, SUPPORTED_VIDEO_EXTENSIONS) {
                    return Err(anyhow!(
                        "unsupported video type for {} (expected one of: {})",
                        config.path,
                        SUPPORTED_VIDEO_EXTENSIONS.join(", ")
                    ));
                }
                open_video(&config)?
            }
        };

        log::info!("FileSource: opened {}", config.path);
        Ok(Self {
            backend,
            config,
            frames_read: 0,
        })
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frames_read,
            path: self.config.path.clone(),
        }
    }

    fn backend_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source,
            FileBackend::Images(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
        }
    }

    fn backend_ref(&self) -> &dyn FrameSource {
        match &self.backend {
            FileBackend::Synthetic(source) => source,
            FileBackend::Images(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
        }
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(max) = self.config.max_frames {
            if self.frames_read >= max {
                return Ok(None);
            }
        }
        let frame = self.backend_mut().next_frame()?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) -> Result<()> {
        log::debug!(
            "FileSource: closing {} after {} frames",
            self.config.path,
            self.frames_read
        );
        self.backend_mut().close()
    }

    fn describe(&self) -> String {
        self.backend_ref().describe()
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(config: &FileConfig) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(config)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(_config: &FileConfig) -> Result<FileBackend> {
    Err(anyhow!(
        "video decoding requires the ingest-file-ffmpeg feature"
    ))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
