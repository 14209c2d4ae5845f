use core::cell::RefCell;
use critical_section::with;

/// State shared between main loop and interrupt handlers
pub struct Mutex<T> {
    inner: RefCell<T>,
}

impl<T> Mutex<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            inner: RefCell::new(inner),
        }
    }

    /// Exclusive mutable access to inner value, interrupts are masked meanwhile
    pub fn access<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        with(|_cs| f(&mut self.inner.borrow_mut()))
    }

    /// Replaces the inner value
    pub fn replace(&self, value: T) {
        with(|_cs| {
            self.inner.replace(value);
        });
    }
}

unsafe impl<T> Sync for Mutex<T> {}
