//! [`Supervisor`] – per-tick DOF ownership.
//!
//! Tasks are registered once, at load, through a [`SupervisorBuilder`] and
//! are immutable afterwards.  Each tick the supervisor works out which tasks
//! are active (`start ≤ elapsed < end`, elapsed measured from the origin and
//! both bounds rounded to ticks with [`Clock::tick_span`]),
//! pushes newly active tasks onto the downstream [`TaskStack`], pops tasks
//! that just became inactive, and hands every contested DOF to the active
//! task with the strictly highest priority.
//!
//! Two tasks with the same priority that share a DOF over overlapping
//! intervals cannot be arbitrated; [`SupervisorBuilder::add_task`] rejects the
//! second one.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gaitplan_kernel::supervisor::SupervisorBuilder;
//! use gaitplan_kernel::task_stack::{SolverStack, TaskStack};
//! use gaitplan_types::{DofSet, Interval, Tick};
//!
//! let mut builder = SupervisorBuilder::new();
//! builder
//!     .add_task("reach", Interval::new(0.0, 1.0).unwrap(), 2, [6, 7].into_iter().collect())
//!     .unwrap();
//! let mut supervisor = builder.build(Duration::from_millis(5), tracing::Span::none());
//! supervisor.set_origin(Tick(0)).unwrap();
//!
//! let mut stack = SolverStack::new();
//! let events = supervisor.step(Tick(0), &mut stack);
//! assert_eq!(events.len(), 1);
//! assert_eq!(stack.tasks(), vec!["reach"]);
//! ```

use std::fmt;
use std::time::Duration;

use gaitplan_signal::Clock;
use gaitplan_types::{Dof, DofSet, Interval, PlanError, TaskEvent, TaskEventKind, Tick};
use tracing::{Span, debug, info};

use crate::task_stack::TaskStack;

// ────────────────────────────────────────────────────────────────────────────
// ScheduledTask
// ────────────────────────────────────────────────────────────────────────────

/// A task registered with the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub name: String,
    pub interval: Interval,
    pub priority: i32,
    pub dofs: DofSet,
}

impl ScheduledTask {
    fn conflicts_with(&self, other: &ScheduledTask) -> Option<Dof> {
        if self.priority != other.priority || !self.interval.overlaps(&other.interval) {
            return None;
        }
        self.dofs.first_shared(&other.dofs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Load-time task registry.
#[derive(Debug, Default)]
pub struct SupervisorBuilder {
    tasks: Vec<ScheduledTask>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Fails with [`PlanError::DuplicateTask`] when the name is taken and with
    /// [`PlanError::PriorityConflict`] when an existing task has the same
    /// priority, an overlapping interval and a shared DOF.
    pub fn add_task(
        &mut self,
        name: impl Into<String>,
        interval: Interval,
        priority: i32,
        dofs: DofSet,
    ) -> Result<&mut Self, PlanError> {
        let task = ScheduledTask {
            name: name.into(),
            interval,
            priority,
            dofs,
        };
        for existing in &self.tasks {
            if existing.name == task.name {
                return Err(PlanError::DuplicateTask(task.name));
            }
            if let Some(dof) = existing.conflicts_with(&task) {
                return Err(PlanError::PriorityConflict {
                    first: existing.name.clone(),
                    second: task.name,
                    dof,
                    priority,
                });
            }
        }
        debug!(task = %task.name, interval = %task.interval, priority, dofs = %task.dofs, "task registered");
        self.tasks.push(task);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Freeze the registry.  `span` is the parent of every log line the
    /// supervisor emits.
    pub fn build(self, period: Duration, span: Span) -> Supervisor {
        let clock = Clock::new(period);
        Supervisor {
            slots: self
                .tasks
                .into_iter()
                .map(|task| TaskSlot {
                    ticks: clock.tick_span(&task.interval),
                    task,
                    active: false,
                    owned: DofSet::new(),
                })
                .collect(),
            clock,
            origin: None,
            span,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TaskSlot {
    task: ScheduledTask,
    /// `[first, end)` tick offsets from the origin.
    ticks: (u64, u64),
    active: bool,
    owned: DofSet,
}

impl TaskSlot {
    fn covers(&self, offset: u64) -> bool {
        self.ticks.0 <= offset && offset < self.ticks.1
    }
}

/// Per-tick view of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus<'a> {
    pub task: &'a ScheduledTask,
    pub active: bool,
    /// DOFs this task commands during the current tick.
    pub owned: &'a DofSet,
}

/// Single authority over DOF ownership.
#[derive(Debug)]
pub struct Supervisor {
    slots: Vec<TaskSlot>,
    clock: Clock,
    origin: Option<Tick>,
    span: Span,
}

impl Supervisor {
    /// Anchor task intervals to `origin`.  Only the first call succeeds.
    pub fn set_origin(&mut self, origin: Tick) -> Result<(), PlanError> {
        if let Some(existing) = self.origin {
            return Err(PlanError::OriginAlreadySet(existing));
        }
        info!(parent: &self.span, %origin, "supervisor origin set");
        self.origin = Some(origin);
        Ok(())
    }

    pub fn origin(&self) -> Option<Tick> {
        self.origin
    }

    /// Seconds since the origin, `None` before it is set or reached.
    pub fn elapsed(&self, tick: Tick) -> Option<f64> {
        self.clock.elapsed(tick, self.origin?)
    }

    /// Names of the tasks whose interval contains `tick`.
    pub fn active_set(&self, tick: Tick) -> Vec<&str> {
        let Some(n) = self.offset(tick) else {
            return Vec::new();
        };
        self.slots
            .iter()
            .filter(|s| s.covers(n))
            .map(|s| s.task.name.as_str())
            .collect()
    }

    fn offset(&self, tick: Tick) -> Option<u64> {
        tick.ticks_since(self.origin?)
    }

    /// Advance to `tick`: update the active set, emit transitions onto
    /// `stack`, and reassign DOF ownership.
    ///
    /// Releases are emitted before activations.  Activations follow
    /// descending priority, then registration order.
    pub fn step(&mut self, tick: Tick, stack: &mut dyn TaskStack) -> Vec<TaskEvent> {
        let now = self.offset(tick);
        let wanted: Vec<bool> = self
            .slots
            .iter()
            .map(|s| now.is_some_and(|n| s.covers(n)))
            .collect();

        let mut events = Vec::new();
        for (slot, &want) in self.slots.iter_mut().zip(&wanted) {
            if slot.active && !want {
                slot.active = false;
                events.push(Self::release(&self.span, tick, slot, stack));
            }
        }

        let mut rising: Vec<usize> = (0..self.slots.len())
            .filter(|&i| wanted[i] && !self.slots[i].active)
            .collect();
        rising.sort_by_key(|&i| std::cmp::Reverse(self.slots[i].task.priority));
        let span = &self.span;
        for i in rising {
            let slot = &mut self.slots[i];
            slot.active = true;
            stack.push(&slot.task.name);
            info!(parent: span, task = %slot.task.name, %tick, "task activated");
            events.push(TaskEvent {
                tick,
                task: slot.task.name.clone(),
                kind: TaskEventKind::Activated,
            });
        }

        self.assign_ownership();
        events
    }

    /// Release every active task, e.g. at the end of the plan or on
    /// cancellation.
    pub fn release_all(&mut self, tick: Tick, stack: &mut dyn TaskStack) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        for slot in self.slots.iter_mut().rev() {
            if slot.active {
                slot.active = false;
                events.push(Self::release(&self.span, tick, slot, stack));
            }
        }
        self.assign_ownership();
        events
    }

    fn release(span: &Span, tick: Tick, slot: &mut TaskSlot, stack: &mut dyn TaskStack) -> TaskEvent {
        if !stack.pop(&slot.task.name) {
            debug!(parent: span, task = %slot.task.name, "task was not on the stack");
        }
        info!(parent: span, task = %slot.task.name, %tick, "task released");
        TaskEvent {
            tick,
            task: slot.task.name.clone(),
            kind: TaskEventKind::Released,
        }
    }

    fn assign_ownership(&mut self) {
        let mut order: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].active)
            .collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.slots[i].task.priority));

        let mut claimed = DofSet::new();
        for slot in &mut self.slots {
            slot.owned = DofSet::new();
        }
        for i in order {
            let slot = &mut self.slots[i];
            let owned: DofSet = slot.task.dofs.iter().filter(|d| !claimed.contains(*d)).collect();
            for d in owned.iter() {
                claimed.insert(d);
            }
            slot.owned = owned;
        }
    }

    /// Active task commanding `dof` this tick.
    pub fn owner_of(&self, dof: Dof) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.active && s.owned.contains(dof))
            .map(|s| s.task.name.as_str())
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.active && s.task.name == name)
    }

    /// Every registered task with its current state, in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = TaskStatus<'_>> {
        self.slots.iter().map(|s| TaskStatus {
            task: &s.task,
            active: s.active,
            owned: &s.owned,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Display for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(o) => writeln!(f, "supervisor (origin tick {o})")?,
            None => writeln!(f, "supervisor (origin not set)")?,
        }
        for s in &self.slots {
            writeln!(
                f,
                "  {:<24} {:<14} prio {:>3}  dofs {:<24} {}  owns {}",
                s.task.name,
                s.task.interval.to_string(),
                s.task.priority,
                s.task.dofs.to_string(),
                if s.active { "active  " } else { "inactive" },
                s.owned
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_stack::SolverStack;

    // ---- helpers ----------------------------------------------------------

    fn dofs(d: &[Dof]) -> DofSet {
        d.iter().copied().collect()
    }

    fn iv(start: f64, end: f64) -> Interval {
        Interval::new(start, end).unwrap()
    }

    /// 100 ms period: one second is ten ticks.
    fn build(builder: SupervisorBuilder) -> Supervisor {
        let mut s = builder.build(Duration::from_millis(100), Span::none());
        s.set_origin(Tick(0)).unwrap();
        s
    }

    // ---- registration -----------------------------------------------------

    #[test]
    fn same_priority_shared_dof_overlap_is_rejected() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 2.0), 3, dofs(&[7])).unwrap();
        let err = b.add_task("b", iv(0.0, 2.0), 3, dofs(&[7])).unwrap_err();
        assert_eq!(
            err,
            PlanError::PriorityConflict {
                first: "a".into(),
                second: "b".into(),
                dof: 7,
                priority: 3
            }
        );
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn partial_dof_overlap_at_equal_priority_is_rejected() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 2.0), 1, dofs(&[1, 2, 3])).unwrap();
        assert!(b.add_task("b", iv(1.0, 4.0), 1, dofs(&[3, 4])).is_err());
    }

    #[test]
    fn accepts_non_overlapping_or_different_priority() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 2.0), 3, dofs(&[7])).unwrap();
        b.add_task("b", iv(2.0, 4.0), 3, dofs(&[7])).unwrap();
        b.add_task("c", iv(0.0, 2.0), 2, dofs(&[7])).unwrap();
        b.add_task("d", iv(0.0, 2.0), 3, dofs(&[8])).unwrap();
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 1.0), 0, DofSet::new()).unwrap();
        assert_eq!(
            b.add_task("a", iv(5.0, 6.0), 1, DofSet::new()).unwrap_err(),
            PlanError::DuplicateTask("a".into())
        );
    }

    // ---- scheduling -------------------------------------------------------

    #[test]
    fn nothing_is_active_outside_intervals() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(1.0, 2.0), 0, dofs(&[1])).unwrap();
        let mut s = build(b);
        let mut stack = SolverStack::new();
        assert!(s.active_set(Tick(0)).is_empty());
        assert!(s.step(Tick(5), &mut stack).is_empty());
        assert!(s.active_set(Tick(20)).is_empty());
    }

    #[test]
    fn nothing_is_active_before_origin() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 2.0), 0, dofs(&[1])).unwrap();
        let s = b.build(Duration::from_millis(100), Span::none());
        assert!(s.active_set(Tick(3)).is_empty());
        assert_eq!(s.elapsed(Tick(3)), None);
    }

    #[test]
    fn single_active_task_owns_all_its_dofs() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 1.0), 0, dofs(&[1, 2])).unwrap();
        b.add_task("b", iv(2.0, 3.0), 5, dofs(&[1, 2])).unwrap();
        let mut s = build(b);
        let mut stack = SolverStack::new();
        s.step(Tick(3), &mut stack);
        assert_eq!(s.active_set(Tick(3)), vec!["a"]);
        assert_eq!(s.owner_of(1), Some("a"));
        assert_eq!(s.owner_of(2), Some("a"));
    }

    #[test]
    fn higher_priority_wins_contested_dof() {
        let mut b = SupervisorBuilder::new();
        b.add_task("low", iv(0.0, 2.0), 1, dofs(&[1, 2])).unwrap();
        b.add_task("high", iv(0.0, 2.0), 4, dofs(&[2, 3])).unwrap();
        let mut s = build(b);
        let mut stack = SolverStack::new();
        let events = s.step(Tick(0), &mut stack);
        // Activation order follows priority.
        assert_eq!(events[0].task, "high");
        assert_eq!(events[1].task, "low");
        assert_eq!(s.owner_of(1), Some("low"));
        assert_eq!(s.owner_of(2), Some("high"));
        assert_eq!(s.owner_of(3), Some("high"));
        // The loser is still active, it just does not own DOF 2.
        assert!(s.is_active("low"));
    }

    #[test]
    fn transitions_push_and_pop_once() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 0.5), 0, dofs(&[1])).unwrap();
        b.add_task("b", iv(0.5, 1.0), 0, dofs(&[1])).unwrap();
        let mut s = build(b);
        let mut stack = SolverStack::new();

        let e0 = s.step(Tick(0), &mut stack);
        assert_eq!(e0.len(), 1);
        assert_eq!(e0[0].kind, TaskEventKind::Activated);
        assert!(s.step(Tick(1), &mut stack).is_empty());

        let e5 = s.step(Tick(5), &mut stack);
        assert_eq!(e5.len(), 2);
        assert_eq!((e5[0].task.as_str(), e5[0].kind), ("a", TaskEventKind::Released));
        assert_eq!((e5[1].task.as_str(), e5[1].kind), ("b", TaskEventKind::Activated));
        assert_eq!(stack.tasks(), vec!["b"]);

        let e10 = s.step(Tick(10), &mut stack);
        assert_eq!(e10.len(), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn release_all_pops_everything() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 5.0), 0, dofs(&[1])).unwrap();
        b.add_task("b", iv(0.0, 5.0), 1, dofs(&[1])).unwrap();
        let mut s = build(b);
        let mut stack = SolverStack::new();
        s.step(Tick(1), &mut stack);
        assert_eq!(stack.len(), 2);
        let events = s.release_all(Tick(2), &mut stack);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == TaskEventKind::Released));
        assert!(stack.is_empty());
        assert_eq!(s.owner_of(1), None);
    }

    #[test]
    fn origin_can_only_be_set_once() {
        let mut s = SupervisorBuilder::new().build(Duration::from_millis(5), Span::none());
        s.set_origin(Tick(4)).unwrap();
        assert_eq!(s.set_origin(Tick(9)), Err(PlanError::OriginAlreadySet(Tick(4))));
        assert_eq!(s.origin(), Some(Tick(4)));
    }

    #[test]
    fn intervals_are_relative_to_origin() {
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.0, 1.0), 0, dofs(&[1])).unwrap();
        let mut s = b.build(Duration::from_millis(100), Span::none());
        s.set_origin(Tick(50)).unwrap();
        assert!(s.active_set(Tick(49)).is_empty());
        assert_eq!(s.active_set(Tick(50)), vec!["a"]);
        assert!(s.active_set(Tick(60)).is_empty());
    }

    #[test]
    fn boundaries_round_like_the_clock() {
        // At 15 ms, tick 30 sits at 0.44999999999999996 s.
        let mut b = SupervisorBuilder::new();
        b.add_task("a", iv(0.45, 0.9), 0, dofs(&[1])).unwrap();
        let mut s = b.build(Duration::from_millis(15), Span::none());
        s.set_origin(Tick(0)).unwrap();
        let mut stack = SolverStack::new();
        assert!(s.step(Tick(29), &mut stack).is_empty());
        let events = s.step(Tick(30), &mut stack);
        assert_eq!(events.len(), 1);
        assert_eq!(s.active_set(Tick(30)), vec!["a"]);
        assert!(s.active_set(Tick(60)).is_empty());
        assert_eq!(s.step(Tick(60), &mut stack).len(), 1);
    }

    #[test]
    fn display_lists_tasks() {
        let mut b = SupervisorBuilder::new();
        b.add_task("walk_com", iv(0.0, 1.0), 3, dofs(&[0, 1])).unwrap();
        let s = build(b);
        let dump = s.to_string();
        assert!(dump.contains("walk_com"));
        assert!(dump.contains("origin tick 0"));
    }
}
