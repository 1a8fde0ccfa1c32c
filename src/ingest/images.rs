//! Image-sequence frame source.
//!
//! Treats a local directory of still images as a video: every PNG/JPEG file is one
//! frame, in file-name order. Useful for pre-extracted footage and fixtures.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, SUPPORTED_IMAGE_EXTENSIONS) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            log::warn!("image directory {} contains no frames", dir.display());
        }

        Ok(Self {
            dir,
            files,
            next_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|e| anyhow!("failed to decode frame {}: {}", path.display(), e))?;
        self.next_index += 1;
        Ok(Some(Frame::from_rgb_image(image.into_rgb8())))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn reads_frames_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 4, Rgb([2, 2, 2])).save(dir.path().join("frame_002.png"))?;
        RgbImage::from_pixel(4, 4, Rgb([1, 1, 1])).save(dir.path().join("frame_001.png"))?;
        std::fs::write(dir.path().join("notes.txt"), b"not a frame")?;

        let mut source = ImageSequenceSource::open(dir.path())?;
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame()?.unwrap().pixel(0, 0), [1, 1, 1]);
        assert_eq!(source.next_frame()?.unwrap().pixel(0, 0), [2, 2, 2]);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_image_is_a_read_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("frame_001.png"), b"garbage")?;
        let mut source = ImageSequenceSource::open(dir.path())?;
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_extension(Path::new("a/B.JPG"), SUPPORTED_IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("a/b.gif"), SUPPORTED_IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("a/noext"), SUPPORTED_IMAGE_EXTENSIONS));
    }
}
