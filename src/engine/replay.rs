//! Bar-by-bar replay over a fixed bar set.
//!
//! A session owns its bars and one pipeline. Stepping feeds the next bars;
//! seeking backward resets the pipeline and replays from bar 0, which the
//! fingerprints guarantee reproduces the same stream.

use anyhow::Result;
use serde::Serialize;

use crate::engine::pipeline::{LayerRules, Pipeline, PipelineSnapshot};
use crate::logging::log_replay;
use crate::model::Bar;
use crate::rules::ReferenceRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Idle,
    Playing,
    Paused,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStatus {
    pub session_id: String,
    pub mode: ReplayMode,
    pub cursor: usize,
    pub total_bars: usize,
    pub speed: f64,
    pub stream_fingerprint: String,
}

pub struct ReplaySession<R: LayerRules = ReferenceRules> {
    session_id: String,
    bars: Vec<Bar>,
    pipeline: Pipeline<R>,
    mode: ReplayMode,
    speed: f64,
}

impl<R: LayerRules> ReplaySession<R> {
    /// Bind `bars` to `pipeline`. The pipeline is reset first.
    pub fn new(session_id: impl Into<String>, bars: Vec<Bar>, mut pipeline: Pipeline<R>) -> Self {
        pipeline.reset();
        let session = Self {
            session_id: session_id.into(),
            bars,
            pipeline,
            mode: ReplayMode::Idle,
            speed: 1.0,
        };
        log_replay("session_opened", &session.session_id, 0, session.bars.len());
        session
    }

    /// Bars already fed to the pipeline; also the index of the next bar.
    pub fn cursor(&self) -> usize {
        self.pipeline.bars().len()
    }

    pub fn total_bars(&self) -> usize {
        self.bars.len()
    }

    pub fn is_done(&self) -> bool {
        self.cursor() >= self.bars.len()
    }

    /// Feed up to `count` more bars, stopping at the end of the set.
    pub fn step(&mut self, count: usize) -> Result<Vec<PipelineSnapshot>> {
        let start = self.cursor();
        let end = start.saturating_add(count).min(self.bars.len());
        let mut out = Vec::with_capacity(end - start);
        for bar in &self.bars[start..end] {
            out.push(self.pipeline.process_bar(*bar)?);
        }
        if self.is_done() {
            self.mode = ReplayMode::Done;
        }
        Ok(out)
    }

    /// Move so that bar `target` (clamped to the set) is the last one processed.
    ///
    /// Forward seeks continue from the cursor. Backward seeks reset the
    /// pipeline and replay from bar 0. Returns the snapshot of bar `target`,
    /// or `None` when the set is empty or the cursor is already there.
    pub fn seek(&mut self, target: usize) -> Result<Option<PipelineSnapshot>> {
        let Some(last) = self.bars.len().checked_sub(1) else {
            return Ok(None);
        };
        let target = target.min(last);
        if target + 1 < self.cursor() {
            self.pipeline.reset();
        }
        let snaps = self.step(target + 1 - self.cursor())?;
        log_replay("seek", &self.session_id, self.cursor(), self.bars.len());

        if self.is_done() {
            self.mode = ReplayMode::Done;
        } else if self.mode == ReplayMode::Done {
            self.mode = ReplayMode::Paused;
        }
        Ok(snaps.into_iter().last())
    }

    /// Back to the state before any bar.
    pub fn rewind(&mut self) {
        self.pipeline.reset();
        self.mode = ReplayMode::Idle;
        log_replay("rewind", &self.session_id, 0, self.bars.len());
    }

    pub fn play(&mut self) {
        if !self.is_done() {
            self.mode = ReplayMode::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.mode == ReplayMode::Playing {
            self.mode = ReplayMode::Paused;
        }
    }

    /// Playback speed multiplier; non-positive values are ignored.
    pub fn set_speed(&mut self, speed: f64) {
        if speed > 0.0 {
            self.speed = speed;
        }
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn pipeline(&self) -> &Pipeline<R> {
        &self.pipeline
    }

    pub fn status(&self) -> ReplayStatus {
        ReplayStatus {
            session_id: self.session_id.clone(),
            mode: self.mode,
            cursor: self.cursor(),
            total_bars: self.bars.len(),
            speed: self.speed,
            stream_fingerprint: self.pipeline.stream_fingerprint(),
        }
    }
}
