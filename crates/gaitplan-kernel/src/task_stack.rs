//! Downstream task stack boundary.
//!
//! The supervisor never talks to the whole-body solver directly; it pushes and
//! pops task names on a [`TaskStack`].  [`SolverStack`] is the in-process
//! implementation used by the runtime and the tests.

use std::fmt;

/// Named stack of solver tasks.
pub trait TaskStack {
    /// Add `task` on top of the stack.
    fn push(&mut self, task: &str);

    /// Remove `task` wherever it sits.  Returns `false` when it was absent.
    fn pop(&mut self, task: &str) -> bool;

    /// Drop every task.
    fn clear(&mut self);

    /// Current tasks, bottom first.
    fn tasks(&self) -> Vec<String>;
}

/// In-memory [`TaskStack`].
#[derive(Debug, Default, Clone)]
pub struct SolverStack {
    stack: Vec<String>,
}

impl SolverStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack pre-loaded with tasks, bottom first.
    pub fn with_tasks<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stack: tasks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.stack.iter().any(|t| t == task)
    }
}

impl TaskStack for SolverStack {
    fn push(&mut self, task: &str) {
        self.stack.push(task.to_string());
    }

    fn pop(&mut self, task: &str) -> bool {
        match self.stack.iter().rposition(|t| t == task) {
            Some(i) => {
                self.stack.remove(i);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.stack.clear();
    }

    fn tasks(&self) -> Vec<String> {
        self.stack.clone()
    }
}

impl fmt::Display for SolverStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stack.join(", "))
    }
}
