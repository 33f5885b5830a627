//! Test doubles shared with downstream crates.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for crates that list it as a dev-dependency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reelsmith_common::{ReelError, ReelResult};
use reelsmith_project_model::FrameSize;

use crate::segmenter::{MediaInfo, MediaProbe};

/// Probe answering from a fixed table; unknown paths are missing files.
#[derive(Debug, Default)]
pub struct TableProbe {
    entries: HashMap<PathBuf, MediaInfo>,
}

impl TableProbe {
    pub fn with(mut self, path: &str, duration: Option<f64>, width: u32, height: u32) -> Self {
        self.entries.insert(
            PathBuf::from(path),
            MediaInfo {
                duration,
                size: FrameSize::new(width, height),
                frame_rate: 30.0,
            },
        );
        self
    }
}

impl MediaProbe for TableProbe {
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        self.entries
            .get(path)
            .copied()
            .ok_or_else(|| ReelError::FileNotFound {
                path: path.to_path_buf(),
            })
    }
}
