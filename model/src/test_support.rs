//! Test-only helpers shared by unit and integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::path::ModelPath;

/// Parse a dotted path, panicking on invalid input.
pub fn path(text: &str) -> ModelPath {
    ModelPath::parse(text).expect("valid test path")
}

/// Ordered record of what rules did, shared between closures.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<String>>>,
}

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// Position of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }
}
