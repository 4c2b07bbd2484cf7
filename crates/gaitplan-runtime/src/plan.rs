//! [`MotionPlan`] – the plan orchestrator.
//!
//! A plan is loaded once from a document, wired, validated, and then driven
//! one tick at a time by an external trigger:
//!
//! ```text
//!  load ──▶ Loaded ──(controls ready)──▶ Ready ──start()──▶ Running
//!                                                              │
//!                             duration reached ──▶ Finished ◀──┤
//!                             cancel token set ──▶ Cancelled ◀─┘
//! ```
//!
//! Every tick runs, in order: the cancellation check, control polling, the
//! corrected follower (which pulls strategies, merger and correction), and
//! the supervisor.  Nothing in a tick blocks.
//!
//! The supervisor origin is the start tick.  The walk's follower starts once
//! the walk interval opens, so its trajectory begins at its own start time.
//!
//! # Example
//!
//! ```
//! use gaitplan_runtime::plan::{MotionPlan, PlanPhase, PlanSettings, StartOutcome};
//!
//! let doc = "
//! duration: 0.05
//! motion:
//!   - joint: { name: head, interval: [0.0, 1.0], dofs: [28, 29] }
//! ";
//! let mut plan = MotionPlan::from_yaml(doc, PlanSettings::default()).unwrap();
//! let now = plan.now();
//! assert_eq!(plan.start(now), StartOutcome::Started);
//! let report = plan.next_tick();
//! assert_eq!(report.events.len(), 1);
//! assert_eq!(report.phase, PlanPhase::Running);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use gaitplan_kernel::{
    CorrectionOperator, CorrectionState, DEFAULT_MAX_STEP, DeadlineStats, SolverStack,
    Supervisor, SupervisorBuilder, TaskStack, TickDeadline, TickTiming,
};
use gaitplan_locomotion::{
    AnalyticalFollower, CorrectedFollower, CorrectedSample, FeetFollower, FollowerState,
};
use gaitplan_perception::{ControlElement, MeasurementBridge};
use gaitplan_signal::{Clock, DEFAULT_PERIOD, SignalGraph};
use gaitplan_types::{PlanError, TaskEvent, Tick};
use tracing::{Span, debug, info, info_span, warn};

use crate::cancel::CancelToken;
use crate::control::{BuiltControl, build_control};
use crate::document::{self, PlanSpec};
use crate::environment::Environment;
use crate::motion::MotionElement;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Runtime settings that do not come from the plan document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSettings {
    /// Control period.
    pub period: Duration,
    /// Evaluation time allowed per tick before an overrun is reported.
    pub deadline_budget: Duration,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            deadline_budget: DEFAULT_PERIOD,
        }
    }
}

/// Lifecycle phase of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    /// Built, some control element still waiting for its first measurement.
    Loaded,
    /// Every element can start.
    Ready,
    Running,
    Finished,
    Cancelled,
}

impl PlanPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanPhase::Finished | PlanPhase::Cancelled)
    }
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanPhase::Loaded => "loaded",
            PlanPhase::Ready => "ready",
            PlanPhase::Running => "running",
            PlanPhase::Finished => "finished",
            PlanPhase::Cancelled => "cancelled",
        })
    }
}

/// Result of [`MotionPlan::start`].  Not starting is not an error: the caller
/// retries on a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyStarted,
    NotReady,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub phase: PlanPhase,
    /// Supervisor activations and releases, releases first.
    pub events: Vec<TaskEvent>,
    /// Corrected follower output, when a walk is running.
    pub correction: Option<CorrectedSample>,
    pub timing: Option<TickTiming>,
}

// ────────────────────────────────────────────────────────────────────────────
// MotionPlan
// ────────────────────────────────────────────────────────────────────────────

/// A loaded motion plan and everything it drives.
pub struct MotionPlan {
    name: String,
    duration: f64,
    duration_ticks: u64,
    environment: Environment,
    motion: Vec<MotionElement>,
    controls: Vec<ControlElement>,
    bridges: BTreeMap<String, MeasurementBridge>,
    follower: Option<CorrectedFollower<AnalyticalFollower>>,
    /// Ticks after the origin at which the follower starts.
    follower_start: u64,
    supervisor: Supervisor,
    stack: Box<dyn TaskStack>,
    clock: Clock,
    phase: PlanPhase,
    started: bool,
    cancel: CancelToken,
    deadline: TickDeadline,
    evaluation_order: Vec<String>,
    span: Span,
}

impl MotionPlan {
    /// Read and load a plan file.
    pub fn load(path: &Path, settings: PlanSettings) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Io(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text, settings)
    }

    /// Load a plan from YAML text.
    pub fn from_yaml(text: &str, settings: PlanSettings) -> Result<Self, PlanError> {
        Self::from_spec(document::parse(text)?, settings)
    }

    /// Build a plan from a decoded document.
    ///
    /// Elements are built in document order: environment, then motion, then
    /// control.  Any error aborts the whole load.
    pub fn from_spec(spec: PlanSpec, settings: PlanSettings) -> Result<Self, PlanError> {
        let span = info_span!("motion_plan", plan = %spec.name);

        let environment = Environment::from_specs(&spec.environment)?;
        debug!(parent: &span, objects = environment.len(), "environment loaded");

        let walks = spec
            .motion
            .iter()
            .filter(|m| matches!(m, document::MotionSpec::Walk(_)))
            .count();
        if walks > 1 {
            return Err(PlanError::MultipleWalks(walks));
        }

        let mut builder = SupervisorBuilder::new();
        let mut motion = Vec::with_capacity(spec.motion.len());
        for (index, m) in spec.motion.into_iter().enumerate() {
            let element = MotionElement::from_spec(index, m, &environment)?;
            debug!(parent: &span, "adding motion element '{}'", element.name());
            for task in element.tasks() {
                builder.add_task(task.name, task.interval, task.priority, task.dofs)?;
            }
            motion.push(element);
        }

        let mut controls = Vec::with_capacity(spec.control.len());
        let mut bridges = BTreeMap::new();
        for (index, c) in spec.control.into_iter().enumerate() {
            let BuiltControl { element, bridge } =
                build_control(index, c, &environment, settings.period)?;
            if controls.iter().any(|e: &ControlElement| e.name() == element.name()) {
                return Err(PlanError::InvalidElement {
                    element: element.name().to_string(),
                    reason: "control element name is used twice".into(),
                });
            }
            debug!(parent: &span, "adding control element '{}'", element.name());
            if let Some(bridge) = bridge {
                bridges.insert(element.name().to_string(), bridge);
            }
            controls.push(element);
        }

        let clock = Clock::new(settings.period);
        let duration_ticks = clock.ticks_for(spec.duration);
        let follower_start = motion
            .iter()
            .find_map(|m| match m {
                MotionElement::Walk(w) => Some(clock.ticks_for(w.interval.start())),
                _ => None,
            })
            .unwrap_or(0);

        let state = CorrectionState::new(spec.max_step.unwrap_or(DEFAULT_MAX_STEP))?;
        let follower = motion.iter().find_map(|m| match m {
            MotionElement::Walk(w) => {
                let follower_span = info_span!(parent: &span, "feet_follower", follower = %w.name);
                let base = AnalyticalFollower::new(w.name.clone(), settings.period, follower_span)
                    .with_reference(w.reference.clone());
                Some(CorrectedFollower::new(
                    base,
                    spec.strategy.build(),
                    CorrectionOperator::new(state, settings.period),
                ))
            }
            _ => None,
        });

        let evaluation_order = wiring(follower.as_ref(), &controls).validate()?;
        debug!(parent: &span, order = ?evaluation_order, "signal wiring validated");

        let supervisor = builder.build(settings.period, info_span!(parent: &span, "supervisor"));

        info!(
            parent: &span,
            motion = motion.len(),
            control = controls.len(),
            tasks = supervisor.len(),
            duration = spec.duration,
            strategy = spec.strategy.tag(),
            "plan loaded"
        );

        let mut plan = Self {
            name: spec.name,
            duration: spec.duration,
            duration_ticks,
            environment,
            motion,
            controls,
            bridges,
            follower,
            follower_start,
            supervisor,
            stack: Box::new(SolverStack::new()),
            clock,
            phase: PlanPhase::Loaded,
            started: false,
            cancel: CancelToken::new(),
            deadline: TickDeadline::new(settings.deadline_budget),
            evaluation_order,
            span,
        };
        plan.refresh_readiness();
        Ok(plan)
    }

    /// Replace the downstream task stack.  Only meaningful before start.
    pub fn with_stack(mut self, stack: Box<dyn TaskStack>) -> Self {
        self.stack = stack;
        self
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn phase(&self) -> PlanPhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn period(&self) -> Duration {
        self.clock.period()
    }

    /// Tick the next call to [`MotionPlan::next_tick`] evaluates.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn motion(&self) -> &[MotionElement] {
        &self.motion
    }

    pub fn controls(&self) -> &[ControlElement] {
        &self.controls
    }

    pub fn follower(&self) -> Option<&CorrectedFollower<AnalyticalFollower>> {
        self.follower.as_ref()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Task names currently on the downstream stack, bottom first.
    pub fn stack_tasks(&self) -> Vec<String> {
        self.stack.tasks()
    }

    /// Input bridge of the stream-fed control element `name`.
    pub fn bridge(&self, name: &str) -> Option<&MeasurementBridge> {
        self.bridges.get(name)
    }

    /// Names of all stream-fed control elements.
    pub fn bridge_names(&self) -> impl Iterator<Item = &str> {
        self.bridges.keys().map(String::as_str)
    }

    /// Handle that stops the plan at the next tick boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn deadline_stats(&self) -> DeadlineStats {
        self.deadline.stats()
    }

    /// Signal evaluation order checked at load, inputs first.
    pub fn evaluation_order(&self) -> &[String] {
        &self.evaluation_order
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// `true` when every control element has data and the follower, if
    /// any, has its reference.
    pub fn can_start(&self) -> bool {
        self.controls.iter().all(ControlElement::can_start)
            && self.follower.as_ref().is_none_or(|f| f.can_start())
    }

    /// Try to start execution at `tick`.
    pub fn start(&mut self, tick: Tick) -> StartOutcome {
        if self.started {
            info!(parent: &self.span, %tick, "already started");
            return StartOutcome::AlreadyStarted;
        }
        if self.phase == PlanPhase::Cancelled {
            info!(parent: &self.span, %tick, "failed to start: plan cancelled");
            return StartOutcome::NotReady;
        }
        for control in &mut self.controls {
            control.poll();
        }
        if !self.can_start() {
            let waiting: Vec<&str> = self
                .controls
                .iter()
                .filter(|c| !c.can_start())
                .map(ControlElement::name)
                .collect();
            info!(parent: &self.span, %tick, ?waiting, "failed to start");
            self.phase = PlanPhase::Loaded;
            return StartOutcome::NotReady;
        }

        self.stack.clear();
        if let Err(e) = self.supervisor.set_origin(tick) {
            warn!(parent: &self.span, error = %e, "supervisor origin kept");
        }
        self.started = true;
        self.phase = PlanPhase::Running;
        info!(parent: &self.span, %tick, "execution starts");
        self.start_follower_at(tick, 0);
        StartOutcome::Started
    }

    /// Evaluate the tick the internal clock points at, then advance it.
    pub fn next_tick(&mut self) -> TickReport {
        let tick = self.clock.now();
        let report = self.tick(tick);
        self.clock.advance();
        report
    }

    /// Evaluate `tick`.
    pub fn tick(&mut self, tick: Tick) -> TickReport {
        self.deadline.begin();
        let mut events = Vec::new();
        let mut correction = None;

        if self.cancel.is_cancelled() && !self.phase.is_terminal() {
            events = self.supervisor.release_all(tick, self.stack.as_mut());
            self.phase = PlanPhase::Cancelled;
            warn!(parent: &self.span, %tick, released = events.len(), "plan cancelled");
        }

        match self.phase {
            PlanPhase::Loaded | PlanPhase::Ready => {
                for control in &mut self.controls {
                    control.poll();
                }
                self.refresh_readiness();
            }
            PlanPhase::Running => {
                let since = self
                    .supervisor
                    .origin()
                    .and_then(|origin| tick.ticks_since(origin));
                if since.is_some_and(|n| n >= self.duration_ticks) {
                    events.extend(self.supervisor.release_all(tick, self.stack.as_mut()));
                    self.phase = PlanPhase::Finished;
                    info!(parent: &self.span, %tick, "plan finished");
                } else if let Some(n) = since {
                    self.start_follower_at(tick, n);
                    if let Some(f) = self.follower.as_mut() {
                        correction = f.correct(tick, &mut self.controls);
                    }
                    if correction.is_none() {
                        for control in &mut self.controls {
                            control.poll();
                        }
                    }
                    events.extend(self.supervisor.step(tick, self.stack.as_mut()));
                }
            }
            PlanPhase::Finished | PlanPhase::Cancelled => {}
        }

        let timing = self.deadline.finish();
        if let Some(t) = timing.filter(|t| t.overrun) {
            warn!(
                parent: &self.span,
                %tick,
                elapsed_us = t.elapsed.as_micros() as u64,
                budget_us = self.deadline.budget().as_micros() as u64,
                "tick deadline overrun"
            );
        }

        TickReport {
            tick,
            phase: self.phase,
            events,
            correction,
            timing,
        }
    }

    /// Start the follower when `since_origin` reached its start offset.
    fn start_follower_at(&mut self, tick: Tick, since_origin: u64) {
        let Some(f) = self.follower.as_mut() else {
            return;
        };
        if f.state() == FollowerState::Idle && since_origin >= self.follower_start {
            f.start(tick);
            let span = &self.span;
            info!(parent: span, %tick, follower = f.name(), "follower starts");
        }
    }

    fn refresh_readiness(&mut self) {
        if self.phase.is_terminal() || self.started {
            return;
        }
        let next = if self.can_start() {
            PlanPhase::Ready
        } else {
            PlanPhase::Loaded
        };
        if next != self.phase {
            debug!(parent: &self.span, from = %self.phase, to = %next, "phase changed");
            self.phase = next;
        }
    }
}

/// Record who reads whom among the components the plan built.
///
/// A control compares its observation with the nominal pose and, for
/// landmark sources, with its environment object.  A strategy reads the
/// nominal pose and the controls of its own family.  The merger reads every
/// strategy, the correction reads the merger, and the corrected trajectory
/// reads the correction and the nominal one.
fn wiring(
    follower: Option<&CorrectedFollower<AnalyticalFollower>>,
    controls: &[ControlElement],
) -> SignalGraph {
    let mut graph = SignalGraph::new();
    let nominal = follower.map(|f| format!("nominal/{}", f.name()));
    for control in controls {
        let node = format!("control/{}", control.name());
        graph.add_node(node.clone());
        if let Some(object) = control.object() {
            graph.add_dependency(node.clone(), format!("object/{object}"));
        }
        if let Some(nominal) = &nominal {
            graph.add_dependency(node, nominal.clone());
        }
    }
    let (Some(follower), Some(nominal)) = (follower, nominal) else {
        return graph;
    };
    for strategy in follower.strategies() {
        let node = format!("strategy/{}", strategy.name());
        graph.add_dependency(node.clone(), nominal.clone());
        for control in controls.iter().filter(|c| c.family() == strategy.family()) {
            graph.add_dependency(node.clone(), format!("control/{}", control.name()));
        }
        graph.add_dependency("merger", node);
    }
    let corrected = format!("corrected/{}", follower.name());
    graph.add_dependency("correction", "merger");
    graph.add_dependency(corrected.clone(), "correction");
    graph.add_dependency(corrected, nominal);
    graph
}

impl fmt::Display for MotionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "plan '{}' [{}] duration {:.3} s, next tick {}",
            self.name,
            self.phase,
            self.duration,
            self.clock.now()
        )?;
        if !self.environment.is_empty() {
            writeln!(f, "environment:")?;
            write!(f, "{}", self.environment)?;
        }
        writeln!(f, "motion:")?;
        for m in &self.motion {
            writeln!(f, "  {m}")?;
        }
        writeln!(f, "control:")?;
        for c in &self.controls {
            writeln!(f, "  {c}")?;
        }
        match &self.follower {
            Some(follower) => writeln!(f, "follower: {follower}")?,
            None => writeln!(f, "follower: none")?,
        }
        write!(f, "{}", self.supervisor)?;
        writeln!(f, "stack: [{}]", self.stack.tasks().join(", "))?;
        writeln!(f, "deadline: {}", self.deadline)
    }
}
