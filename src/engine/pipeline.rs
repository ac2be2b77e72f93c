//! Per-bar orchestration of every layer, the recursive stack and the audit.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditSuite, Violation};
use crate::config::{InvariantMode, StackConfig};
use crate::engine::layer::{LayerEngine, Snapshot};
use crate::fingerprint::StreamDigest;
use crate::logging::{log_bar, log_batch, log_system, log_violation, ProfileScope};
use crate::model::{Bar, BuySellPoint, Divergence, DomainEvent, Segment, Stroke, Timestamp};
use crate::recursion::compose::components_from_segments;
use crate::recursion::{LevelFrame, LevelSnapshot, RecursiveLevelEngine, RecursiveStack};
use crate::rules::ReferenceRules;
use crate::search::{AmplitudeDivergence, DivergenceDetector, StackView};

/// Level-1 geometry supplied to the pipeline.
///
/// Every method is a pure function of its input and is called with the full
/// current list of the layer below on every bar.
pub trait LayerRules {
    fn strokes(&self, bars: &[Bar]) -> Vec<Stroke>;

    fn segments(&self, strokes: &[Stroke]) -> Vec<Segment>;

    fn divergences(&self, frame: &LevelFrame) -> Vec<Divergence> {
        AmplitudeDivergence.detect(frame)
    }

    fn buy_sell_points(&self, frame: &LevelFrame, divergences: &[Divergence]) -> Vec<BuySellPoint>;
}

/// Everything one bar produced, in causal order.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub bar_index: u64,
    pub bar_ts: Timestamp,
    pub strokes: Snapshot<Stroke>,
    pub segments: Snapshot<Segment>,
    pub level1: LevelSnapshot,
    pub divergences: Snapshot<Divergence>,
    pub points: Snapshot<BuySellPoint>,
    /// Levels 2 and up, ascending.
    pub levels: Vec<LevelSnapshot>,
    pub violations: Vec<Violation>,
}

impl PipelineSnapshot {
    /// Layer order first, then recursion levels in ascending order.
    pub fn events(&self) -> impl Iterator<Item = &DomainEvent> {
        self.strokes
            .events
            .iter()
            .chain(self.segments.events.iter())
            .chain(self.level1.events())
            .chain(self.divergences.events.iter())
            .chain(self.points.events.iter())
            .chain(self.levels.iter().flat_map(|l| l.events()))
    }

    pub fn event_count(&self) -> usize {
        self.events().count()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Bars in, lifecycle events out.
pub struct Pipeline<R: LayerRules = ReferenceRules> {
    config: StackConfig,
    rules: R,
    bars: Vec<Bar>,
    strokes: LayerEngine<Stroke>,
    segments: LayerEngine<Segment>,
    level1: RecursiveLevelEngine,
    divergences: LayerEngine<Divergence>,
    points: LayerEngine<BuySellPoint>,
    stack: RecursiveStack,
    audit: AuditSuite,
    journal: Vec<DomainEvent>,
    digest: StreamDigest,
}

impl Pipeline<ReferenceRules> {
    pub fn with_reference_rules(config: StackConfig) -> Self {
        Self::new(config, ReferenceRules)
    }
}

impl<R: LayerRules> Pipeline<R> {
    pub fn new(config: StackConfig, rules: R) -> Self {
        log_system(
            "pipeline_created",
            &config.stream_id,
            &format!(
                "max_levels={} invariants={}",
                config.max_levels,
                config.invariant_mode.as_str()
            ),
        );
        Self {
            stack: RecursiveStack::new(config.max_levels),
            config,
            rules,
            bars: Vec::new(),
            strokes: LayerEngine::new(1),
            segments: LayerEngine::new(1),
            level1: RecursiveLevelEngine::new(1),
            divergences: LayerEngine::new(1),
            points: LayerEngine::new(1),
            audit: AuditSuite::new(),
            journal: Vec::new(),
            digest: StreamDigest::default(),
        }
    }

    /// Append one bar and push it through every layer and level.
    ///
    /// In hard invariant mode any violation fails the bar. State has already
    /// advanced by then; call [`reset`](Self::reset) before reusing the pipeline.
    pub fn process_bar(&mut self, bar: Bar) -> Result<PipelineSnapshot> {
        let bar_index = self.bars.len() as u64;
        let bar_ts = bar.ts;
        let _scope = ProfileScope::with_context(
            "process_bar",
            &[("bar_index", json!(bar_index)), ("stream_id", json!(self.config.stream_id))],
        );
        log_bar(&self.config.stream_id, bar_index, &bar);
        self.bars.push(bar);

        let rules = &self.rules;
        let strokes = self.strokes.process(
            &|bars: &[Bar]| rules.strokes(bars),
            self.bars.as_slice(),
            bar_index,
            bar_ts,
        )?;
        let segments = self
            .segments
            .process_snapshot(&|s: &[Stroke]| rules.segments(s), &strokes)?;
        let level1 = self.level1.process_components(
            components_from_segments(&segments.entities),
            bar_index,
            bar_ts,
        )?;
        let frame = level1.frame();
        let divergences = self.divergences.process(
            &|f: &LevelFrame| rules.divergences(f),
            &frame,
            bar_index,
            bar_ts,
        )?;
        let points = self.points.process(
            &|f: &LevelFrame| rules.buy_sell_points(f, &divergences.entities),
            &frame,
            bar_index,
            bar_ts,
        )?;
        let levels = self.stack.process(&level1.moves.entities, bar_index, bar_ts)?;

        let mut violations = self.audit.check_strokes(&strokes);
        violations.extend(self.audit.check_segments(&segments));
        violations.extend(self.audit.check_level(&level1));
        violations.extend(self.audit.check_divergences(&divergences));
        violations.extend(self.audit.check_points(&points));
        for level in &levels {
            violations.extend(self.audit.check_level(level));
        }

        let snapshot = PipelineSnapshot {
            bar_index,
            bar_ts,
            strokes,
            segments,
            level1,
            divergences,
            points,
            levels,
            violations,
        };
        self.record(&snapshot);

        if self.config.invariant_mode == InvariantMode::Hard && !snapshot.violations.is_empty() {
            let listed: Vec<String> = snapshot
                .violations
                .iter()
                .map(|v| format!("{}@L{}: {}", v.rule, v.level_id, v.reason))
                .collect();
            bail!(
                "{} invariant violation(s) at bar {}: {}",
                listed.len(),
                bar_index,
                listed.join("; ")
            );
        }
        Ok(snapshot)
    }

    /// Process bars in order, stopping at the first failure.
    pub fn process_bars<I>(&mut self, bars: I) -> Result<Vec<PipelineSnapshot>>
    where
        I: IntoIterator<Item = Bar>,
    {
        bars.into_iter().map(|bar| self.process_bar(bar)).collect()
    }

    fn record(&mut self, snap: &PipelineSnapshot) {
        let bar_index = snap.bar_index;
        log_batch("stroke", 1, bar_index, &snap.strokes.events);
        log_batch("segment", 1, bar_index, &snap.segments.events);
        log_batch("center", 1, bar_index, &snap.level1.centers.events);
        log_batch("move", 1, bar_index, &snap.level1.moves.events);
        log_batch("divergence", 1, bar_index, &snap.divergences.events);
        log_batch("bsp", 1, bar_index, &snap.points.events);
        for level in &snap.levels {
            log_batch("center", level.level_id, bar_index, &level.centers.events);
            log_batch("move", level.level_id, bar_index, &level.moves.events);
        }
        for v in &snap.violations {
            log_violation(
                &self.config.stream_id,
                v.rule.as_str(),
                &v.reason,
                v.level_id,
                v.bar_index,
                &v.fingerprint,
            );
        }
        for ev in snap.events() {
            self.digest.push(&ev.fingerprint);
        }
        self.journal.extend(snap.events().cloned());
    }

    /// Events emitted since creation, the last reset or the last drain.
    ///
    /// Grows with every bar. Long runs should call
    /// [`drain_journal`](Self::drain_journal) periodically.
    pub fn journal(&self) -> &[DomainEvent] {
        &self.journal
    }

    /// Hand over the buffered events and start an empty journal.
    ///
    /// The stream fingerprint still covers drained events.
    pub fn drain_journal(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.journal)
    }

    /// Fingerprint of every event since creation or the last reset.
    pub fn stream_fingerprint(&self) -> String {
        self.digest.hex()
    }

    /// Events folded into [`stream_fingerprint`](Self::stream_fingerprint).
    pub fn event_total(&self) -> u64 {
        self.digest.count()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn stack(&self) -> &RecursiveStack {
        &self.stack
    }

    pub fn level1(&self) -> &RecursiveLevelEngine {
        &self.level1
    }

    pub fn divergences(&self) -> &[Divergence] {
        self.divergences.current()
    }

    pub fn points(&self) -> &[BuySellPoint] {
        self.points.current()
    }

    /// Current state of every level for the nested search.
    pub fn stack_view(&self) -> StackView {
        StackView::new(
            self.segments.current().to_vec(),
            std::iter::once(self.level1.frame()).chain(self.stack.frames()),
        )
    }

    /// Drop all bars, entities, sequences and audit state.
    pub fn reset(&mut self) {
        self.bars.clear();
        self.strokes.reset();
        self.segments.reset();
        self.level1.reset();
        self.divergences.reset();
        self.points.reset();
        self.stack.reset();
        self.audit.reset();
        self.journal.clear();
        self.digest = StreamDigest::default();
        log_system("pipeline_reset", &self.config.stream_id, "state cleared");
    }
}
