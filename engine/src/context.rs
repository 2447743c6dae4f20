use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::EntityDatabase;
use crate::file_manager::FileManager;
use crate::progress::ProgressCoordinator;

/// Inclusive frame range of the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self { start: 0, end: 250 }
    }
}

impl TimeRange {
    pub fn contains(&self, frame: i64) -> bool {
        (self.start..=self.end).contains(&frame)
    }

    /// Frame after `frame`, wrapping to `start` past the end.
    pub fn next(&self, frame: i64) -> i64 {
        if frame >= self.end || frame < self.start {
            self.start
        } else {
            frame + 1
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Everything one run needs besides the graphs themselves. Cloned into the
/// background task, so all shared parts are behind `Arc`.
#[derive(Clone)]
pub struct ExecutionContext {
    pub(crate) frame: i64,
    pub(crate) fps: f64,
    pub(crate) playing: bool,
    pub(crate) time_range: TimeRange,
    pub(crate) render_rect: RenderRect,
    pub(crate) parallel_chunk_size: usize,
    pub(crate) entities: Arc<dyn EntityDatabase>,
    pub(crate) files: Arc<dyn FileManager>,
    pub(crate) coordinator: Arc<ProgressCoordinator>,
}

impl ExecutionContext {
    pub fn new(
        entities: Arc<dyn EntityDatabase>,
        files: Arc<dyn FileManager>,
        coordinator: Arc<ProgressCoordinator>,
    ) -> Self {
        Self {
            frame: 0,
            fps: 24.0,
            playing: false,
            time_range: TimeRange::default(),
            render_rect: RenderRect::default(),
            parallel_chunk_size: 1024,
            entities,
            files,
            coordinator,
        }
    }

    pub fn with_frame(mut self, frame: i64) -> Self {
        self.frame = frame;
        self
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame as f64 / self.fps
        } else {
            0.0
        }
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn render_rect(&self) -> RenderRect {
        self.render_rect
    }

    pub fn parallel_chunk_size(&self) -> usize {
        self.parallel_chunk_size
    }

    pub fn entities(&self) -> &dyn EntityDatabase {
        self.entities.as_ref()
    }

    pub fn files(&self) -> &dyn FileManager {
        self.files.as_ref()
    }

    pub fn coordinator(&self) -> &ProgressCoordinator {
        &self.coordinator
    }

    pub fn interrupted(&self) -> bool {
        self.coordinator.interrupted()
    }
}
