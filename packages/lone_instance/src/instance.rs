use crate::{Outcome, shared};

const DO_SOMETHING_RESULT: &str = "Doing something.";

shared!(static INSTANCE: Instance = Instance::new());

/// The one process-wide instance, obtained via [`get_instance()`].
///
/// It carries no meaningful state. Callers cannot create additional instances, so identity
/// comparison (`std::ptr::eq`) between any two handles always holds.
#[derive(Debug)]
pub struct Instance {
    // Never zero-sized: boxed zero-sized values all share one dangling address, which would
    // make distinct constructions indistinguishable by identity.
    _identity: u8,
}

impl Instance {
    const fn new() -> Self {
        Self { _identity: 0 }
    }

    /// Performs the instance's one behavior. Pure, always returns the same text.
    #[must_use]
    pub fn do_something(&self) -> &'static str {
        DO_SOMETHING_RESULT
    }
}

/// Returns the process-wide [`Instance`], constructing it on the first call from any thread.
///
/// # Example
///
/// ```
/// let first = lone_instance::get_instance();
/// let second = lone_instance::get_instance();
///
/// assert!(std::ptr::eq(first, second));
/// assert_eq!(first.do_something(), "Doing something.");
/// ```
#[must_use]
pub fn get_instance() -> &'static Instance {
    INSTANCE.get_instance()
}

/// Same as [`get_instance()`] but also reports whether this call constructed the instance.
///
/// Exactly one call per process observes [`Outcome::Constructed`].
#[must_use]
pub fn get_instance_with_outcome() -> (&'static Instance, Outcome) {
    INSTANCE.get_instance_with_outcome()
}
