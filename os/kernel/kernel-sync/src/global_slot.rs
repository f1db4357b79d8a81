use crate::SpinLock;
use core::fmt;

/// A process-wide resource that is installed once during boot.
///
/// The slot starts empty. [`install`](Self::install) moves the value in;
/// afterwards every access goes through the slot's spin lock. Touching the
/// slot before installation is a fatal assertion carrying the slot's name,
/// since it means the boot sequence ran out of order.
///
/// ```rust
/// use kernel_sync::GlobalSlot;
///
/// static COUNTER: GlobalSlot<u32> = GlobalSlot::new("counter");
///
/// COUNTER.install(1).unwrap();
/// COUNTER.with(|c| *c += 1);
/// assert_eq!(COUNTER.with(|c| *c), 2);
/// assert!(COUNTER.install(5).is_err());
/// ```
pub struct GlobalSlot<T> {
    name: &'static str,
    value: SpinLock<Option<T>>,
}

/// Returned by [`GlobalSlot::install`] when the slot already holds a value.
/// Carries the rejected value back to the caller.
pub struct AlreadyInstalled<T>(pub T);

impl<T> fmt::Debug for AlreadyInstalled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyInstalled(..)")
    }
}

impl<T> GlobalSlot<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: SpinLock::new(None),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Move `value` into the slot. Fails if the slot was already installed.
    ///
    /// # Errors
    /// [`AlreadyInstalled`] with the rejected value.
    pub fn install(&self, value: T) -> Result<(), AlreadyInstalled<T>> {
        let mut guard = self.value.lock();
        if guard.is_some() {
            return Err(AlreadyInstalled(value));
        }
        *guard = Some(value);
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Run `f` with exclusive access to the installed value.
    ///
    /// # Panics
    /// If the slot has not been installed yet.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.value.lock();
        match guard.as_mut() {
            Some(value) => f(value),
            None => panic!("{} used before initialization", self.name),
        }
    }

    /// Like [`with`](Self::with), but returns `None` instead of panicking
    /// when the slot is empty.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.value.lock().as_mut().map(f)
    }
}
