use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::FrameSource;
use crate::frame::Frame;

/// Frames held in memory, optionally followed by a read failure instead of a clean end.
pub struct MemorySource {
    name: String,
    frames: VecDeque<Frame>,
    failure: Option<String>,
    delivered: u64,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into(),
            failure: None,
            delivered: 0,
        }
    }

    /// After the queued frames run out, report `message` as a read error.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some(frame) => {
                self.delivered += 1;
                Ok(Some(frame))
            }
            None => match &self.failure {
                Some(message) => Err(anyhow!("{}: {}", self.name, message)),
                None => Ok(None),
            },
        }
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_then_ends() {
        let mut source = MemorySource::new("t", vec![Frame::filled(1, 1, [0, 0, 0])]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.delivered(), 1);
    }

    #[test]
    fn injected_failure_is_an_error_not_end_of_stream() {
        let mut source = MemorySource::new("t", vec![]).failing_with("disk gone");
        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }
}
