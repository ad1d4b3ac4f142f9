use std::any::type_name;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Mutex, PoisonError};
use std::{mem, ptr};

use tracing::{debug, info, trace};

use crate::Outcome;

/// A container that constructs its value at most once and then hands out shared references
/// to that same value for as long as the container lives.
///
/// Initialization uses double-checked locking:
///
/// 1. The published pointer is read with an `Acquire` load. If a value is present, it is
///    returned without touching the guard. This is the path taken by every access except the
///    first few.
/// 2. Otherwise the guard is acquired and the pointer is checked again, because another caller
///    may have finished initialization while we were waiting.
/// 3. If the slot is still empty, the initializer runs, the value is boxed and its address is
///    published with a `Release` store before the guard is released.
///
/// The initializer is therefore executed by exactly one caller, even when any number of threads
/// race to access an empty slot. All other callers block on the guard until the value exists.
///
/// # Example
///
/// ```
/// use lone_instance::{OnceSlot, Outcome};
///
/// let slot = OnceSlot::new();
///
/// let (first, outcome) = slot.get_or_init_with_outcome(|| String::from("hello"));
/// assert_eq!(outcome, Outcome::Constructed);
///
/// let (second, outcome) = slot.get_or_init_with_outcome(|| String::from("ignored"));
/// assert_eq!(outcome, Outcome::AlreadyExisted);
///
/// assert!(std::ptr::eq(first, second));
/// assert_eq!(second, "hello");
/// ```
///
/// # Panics and failures
///
/// If the initializer panics or (with [`get_or_try_init()`][Self::get_or_try_init]) returns an
/// error, nothing is published and the guard is released. The next caller runs its own
/// initializer.
///
/// # Deadlocks
///
/// Accessing the same slot from inside its own initializer deadlocks.
pub struct OnceSlot<T> {
    /// Null until the value is published. Once non-null, never changes again for the life of
    /// the slot, except through exclusive (`&mut self`) access.
    published: AtomicPtr<T>,

    /// Serializes the check-construct-publish sequence on the slow path.
    guard: Mutex<()>,

    // We own the `Box<T>` behind `published`. The raw pointer also opts us out of the auto
    // traits, which are implemented manually below with the bounds a once-cell requires.
    _value: PhantomData<*mut T>,
}

// SAFETY: Moving the slot to another thread moves the owned `T` with it.
unsafe impl<T: Send> Send for OnceSlot<T> {}

// SAFETY: Shared access hands out `&T` to any thread, so `T: Sync` is required. The value may
// also be constructed on one thread and dropped on another (whichever owns the slot), so
// `T: Send` is required as well.
unsafe impl<T: Send + Sync> Sync for OnceSlot<T> {}

impl<T> OnceSlot<T> {
    /// Creates an empty slot.
    ///
    /// This is a `const fn`, so a slot can be placed directly in a `static` item.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            published: AtomicPtr::new(ptr::null_mut()),
            guard: Mutex::new(()),
            _value: PhantomData,
        }
    }

    /// Returns the value if it has been published. Never blocks and never constructs.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        let published = self.published.load(Ordering::Acquire);

        // SAFETY: A non-null pointer came from `Box::into_raw()` in `initialize()` and was
        // stored with `Release` ordering after the value was fully constructed. Our `Acquire`
        // load synchronizes with that store. The box is only reclaimed through `&mut self` or
        // by value, so it outlives the shared borrow we tie the reference to.
        unsafe { published.as_ref() }
    }

    /// Whether the value has been published.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        !self.published.load(Ordering::Acquire).is_null()
    }

    /// Returns the value, constructing it with `init` if the slot is still empty.
    ///
    /// When several threads call this concurrently on an empty slot, exactly one of them runs
    /// its `init`. The others block until the value is published and then return it, dropping
    /// their own `init` without calling it.
    pub fn get_or_init<F>(&self, init: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.get_or_init_with_outcome(init).0
    }

    /// Same as [`get_or_init()`][Self::get_or_init] but also reports whether this call is the
    /// one that constructed the value.
    pub fn get_or_init_with_outcome<F>(&self, init: F) -> (&T, Outcome)
    where
        F: FnOnce() -> T,
    {
        match self.get_or_try_init_with_outcome(|| Ok::<T, Infallible>(init())) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Returns the value, constructing it with the fallible `init` if the slot is still empty.
    ///
    /// # Errors
    ///
    /// Returns the error of `init` if this call ran it and it failed. The slot remains empty
    /// and a later call may try again.
    pub fn get_or_try_init<F, E>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_try_init_with_outcome(init).map(|(value, _)| value)
    }

    /// Returns an exclusive reference to the value if it has been published.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let published = *self.published.get_mut();

        // SAFETY: The pointer is either null or owned by us (see `get()`), and `&mut self`
        // guarantees nobody else holds a reference derived from it.
        unsafe { published.as_mut() }
    }

    /// Consumes the slot, returning the value if it has been published.
    #[must_use]
    pub fn into_inner(mut self) -> Option<T> {
        self.take_box().map(|value| *value)
    }

    fn get_or_try_init_with_outcome<F, E>(&self, init: F) -> Result<(&T, Outcome), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get() {
            trace!(value_type = type_name::<T>(), "single instance already created");
            return Ok((value, Outcome::AlreadyExisted));
        }

        self.initialize(init)
    }

    #[cold]
    fn initialize<F, E>(&self, init: F) -> Result<(&T, Outcome), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        // The pointer is only written after `init` has returned a value, so a guard poisoned
        // by a panicking initializer does not protect any half-written state.
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(value) = self.get() {
            debug!(
                value_type = type_name::<T>(),
                "single instance was created while waiting for the guard"
            );
            return Ok((value, Outcome::AlreadyExisted));
        }

        info!(value_type = type_name::<T>(), "creating single instance now");

        let value = Box::into_raw(Box::new(init()?));

        // Pairs with the `Acquire` load in `get()`. Fast path readers never take the guard.
        self.published.store(value, Ordering::Release);

        // SAFETY: `value` came from `Box::into_raw()` above so it is non-null and valid. It is
        // only reclaimed through `&mut self` or by value, which cannot overlap with `&self`.
        let value = unsafe { &*value };

        Ok((value, Outcome::Constructed))
    }

    fn take_box(&mut self) -> Option<Box<T>> {
        let published = mem::replace(self.published.get_mut(), ptr::null_mut());

        if published.is_null() {
            return None;
        }

        // SAFETY: The pointer came from `Box::into_raw()` and we just replaced it with null,
        // so ownership of the box is transferred to us exactly once.
        Some(unsafe { Box::from_raw(published) })
    }
}

impl<T> Default for OnceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OnceSlot<T> {
    fn drop(&mut self) {
        drop(self.take_box());
    }
}

impl<T> fmt::Debug for OnceSlot<T>
where
    T: fmt::Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());

        match self.get() {
            Some(value) => debug.field("value", value),
            None => debug.field("value", &format_args!("<uninit>")),
        };

        debug.finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, MutexGuard};

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::{run_concurrently, with_watchdog};

    use super::*;

    assert_impl_all!(OnceSlot<u32>: Send, Sync);
    assert_impl_all!(OnceSlot<Cell<u32>>: Send);
    assert_not_impl_any!(OnceSlot<Cell<u32>>: Sync);
    assert_not_impl_any!(OnceSlot<Rc<u32>>: Send, Sync);
    // Sync but not Send: sharing the slot would let another thread construct the value that
    // the owning thread later drops.
    assert_not_impl_any!(OnceSlot<MutexGuard<'static, ()>>: Send, Sync);

    /// Increments the shared counter when dropped.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn new_slot_is_empty() {
        let slot = OnceSlot::<u32>::new();

        assert!(!slot.is_initialized());
        assert!(slot.get().is_none());
    }

    #[test]
    fn sequential_access_constructs_once() {
        let slot = OnceSlot::new();
        let init_calls = Cell::new(0_u32);

        let (first, first_outcome) = slot.get_or_init_with_outcome(|| {
            init_calls.set(init_calls.get().saturating_add(1));
            42
        });
        let (second, second_outcome) = slot.get_or_init_with_outcome(|| {
            init_calls.set(init_calls.get().saturating_add(1));
            99
        });

        assert_eq!(first_outcome, Outcome::Constructed);
        assert_eq!(second_outcome, Outcome::AlreadyExisted);
        assert_eq!(init_calls.get(), 1);
        assert!(ptr::eq(first, second));
        assert_eq!(*second, 42);
        assert!(slot.is_initialized());
        assert!(ptr::eq(slot.get().unwrap(), first));
    }

    #[test]
    fn failed_init_leaves_slot_empty() {
        let slot = OnceSlot::<u32>::new();

        let result = slot.get_or_try_init(|| Err("not today"));

        assert_eq!(result, Err("not today"));
        assert!(!slot.is_initialized());

        let value = slot.get_or_try_init(|| Ok::<_, &str>(7)).unwrap();
        assert_eq!(*value, 7);

        // The value is in place, so the failing initializer is never called.
        let value = slot
            .get_or_try_init(|| -> Result<u32, &str> { panic!("must not be called") })
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[test]
    fn panicking_init_does_not_leave_guard_locked() {
        let slot = OnceSlot::<u32>::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            slot.get_or_init(|| panic!("initializer failed"));
        }));

        assert!(result.is_err());
        assert!(!slot.is_initialized());

        let (value, outcome) = slot.get_or_init_with_outcome(|| 5);
        assert_eq!(*value, 5);
        assert_eq!(outcome, Outcome::Constructed);
    }

    #[test]
    fn concurrent_access_constructs_once() {
        with_watchdog(|| {
            let slot = OnceSlot::new();
            let init_calls = AtomicUsize::new(0);

            let results = run_concurrently(100, || {
                let (value, outcome) = slot.get_or_init_with_outcome(|| {
                    init_calls.fetch_add(1, Ordering::Relaxed);
                    String::from("shared")
                });

                (ptr::from_ref(value).addr(), outcome)
            });

            assert_eq!(init_calls.load(Ordering::Relaxed), 1);
            assert_eq!(
                results
                    .iter()
                    .filter(|(_, outcome)| outcome.is_constructed())
                    .count(),
                1
            );

            let expected_addr = ptr::from_ref(slot.get().unwrap()).addr();
            assert!(results.iter().all(|(addr, _)| *addr == expected_addr));
        });
    }

    #[test]
    fn concurrent_failures_then_success() {
        with_watchdog(|| {
            let slot = OnceSlot::<u64>::new();
            let attempts = AtomicUsize::new(0);

            // The first three attempts fail, so exactly three callers get an error and the
            // fourth attempt publishes the value for everyone else.
            let results = run_concurrently(16, || {
                slot.get_or_try_init(|| {
                    let attempt = attempts.fetch_add(1, Ordering::Relaxed);

                    if attempt < 3 { Err(attempt) } else { Ok(1234) }
                })
                .copied()
            });

            assert_eq!(attempts.load(Ordering::Relaxed), 4);
            assert_eq!(results.iter().filter(|r| r.is_err()).count(), 3);
            assert!(results.iter().filter_map(|r| r.ok()).all(|v| v == 1234));
            assert_eq!(slot.get(), Some(&1234));
        });
    }

    #[test]
    fn drop_releases_value_once() {
        let drops = Arc::new(AtomicUsize::new(0));

        {
            let slot = OnceSlot::new();
            slot.get_or_init(|| DropCounter(Arc::clone(&drops)));
            slot.get_or_init(|| DropCounter(Arc::clone(&drops)));

            assert_eq!(drops.load(Ordering::Relaxed), 0);
        }

        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_of_empty_slot_is_noop() {
        let slot = OnceSlot::<DropCounter>::new();
        drop(slot);
    }

    #[test]
    fn into_inner_returns_value_without_double_drop() {
        let drops = Arc::new(AtomicUsize::new(0));

        let slot = OnceSlot::new();
        slot.get_or_init(|| DropCounter(Arc::clone(&drops)));

        let value = slot.into_inner().unwrap();
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        drop(value);
        assert_eq!(drops.load(Ordering::Relaxed), 1);

        assert!(OnceSlot::<u32>::new().into_inner().is_none());
    }

    #[test]
    fn get_mut_modifies_published_value() {
        let mut slot = OnceSlot::new();
        assert!(slot.get_mut().is_none());

        slot.get_or_init(|| vec![1, 2]);
        slot.get_mut().unwrap().push(3);

        assert_eq!(slot.get().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn usable_as_static() {
        static SLOT: OnceSlot<&str> = OnceSlot::new();

        let first = SLOT.get_or_init(|| "static");
        let second = SLOT.get_or_init(|| "other");

        assert!(ptr::eq(first, second));
        assert_eq!(*second, "static");
    }

    #[test]
    fn debug_shows_state() {
        let slot = OnceSlot::new();
        assert!(format!("{slot:?}").contains("<uninit>"));

        slot.get_or_init(|| 31337);
        assert!(format!("{slot:?}").contains("31337"));
    }
}
