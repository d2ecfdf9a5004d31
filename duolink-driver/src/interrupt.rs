//! Interrupt sources and vector dispatch

/// Hardware event consumer
///
/// Implementors run in interrupt context. They must not block and should only
/// update bounded state or post work for the dispatch loop.
pub trait InterruptSource {
    fn on_event(&self);
}

/// Hardware interrupt vector number
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector(u16);

impl Vector {
    pub const fn new(number: u16) -> Self {
        Self(number)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Vector {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Vector> for u16 {
    fn from(value: Vector) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    /// Vector number does not fit the dispatcher table
    OutOfRange,
    /// Another source is already bound to the vector
    Occupied,
}

/// Table mapping vector numbers to interrupt sources
///
/// The dispatcher is filled during bring-up and then shared with the vector table,
/// which calls [`Dispatcher::dispatch`] with the number of the active vector.
pub struct Dispatcher<'a, const N: usize> {
    sources: [Option<&'a (dyn InterruptSource + Sync)>; N],
}

impl<'a, const N: usize> Dispatcher<'a, N> {
    pub const fn new() -> Self {
        Self { sources: [None; N] }
    }

    pub fn register(
        &mut self,
        vector: Vector,
        source: &'a (dyn InterruptSource + Sync),
    ) -> Result<(), RegisterError> {
        let slot = self
            .sources
            .get_mut(usize::from(vector.0))
            .ok_or(RegisterError::OutOfRange)?;
        if slot.is_some() {
            return Err(RegisterError::Occupied);
        }
        *slot = Some(source);
        Ok(())
    }

    pub fn unregister(&mut self, vector: Vector) -> Option<&'a (dyn InterruptSource + Sync)> {
        self.sources.get_mut(usize::from(vector.0))?.take()
    }

    pub fn is_registered(&self, vector: Vector) -> bool {
        matches!(self.sources.get(usize::from(vector.0)), Some(Some(_)))
    }

    /// Forwards the event to the bound source.
    ///
    /// Returns false for unbound vectors, so the platform can count spurious interrupts.
    pub fn dispatch(&self, vector: Vector) -> bool {
        match self.sources.get(usize::from(vector.0)) {
            Some(Some(source)) => {
                source.on_event();
                true
            }
            _ => false,
        }
    }
}

impl<const N: usize> Default for Dispatcher<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl InterruptSource for Counter {
        fn on_event(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_dispatch_bound_vector() {
        let timer = Counter(AtomicUsize::new(0));
        let dma = Counter(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::<8>::new();
        dispatcher.register(Vector::new(1), &timer).unwrap();
        dispatcher.register(Vector::new(5), &dma).unwrap();

        assert!(dispatcher.dispatch(Vector::new(1)));
        assert!(dispatcher.dispatch(Vector::new(1)));
        assert!(dispatcher.dispatch(Vector::new(5)));
        assert!(!dispatcher.dispatch(Vector::new(2)));
        assert!(!dispatcher.dispatch(Vector::new(100)));

        assert_eq!(timer.0.load(Ordering::Relaxed), 2);
        assert_eq!(dma.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_register_errors() {
        let source = Counter(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::<4>::new();
        dispatcher.register(Vector::new(0), &source).unwrap();

        assert_eq!(
            dispatcher.register(Vector::new(0), &source),
            Err(RegisterError::Occupied)
        );
        assert_eq!(
            dispatcher.register(Vector::new(4), &source),
            Err(RegisterError::OutOfRange)
        );

        assert!(dispatcher.unregister(Vector::new(0)).is_some());
        assert!(!dispatcher.is_registered(Vector::new(0)));
        dispatcher.register(Vector::new(0), &source).unwrap();
    }
}
