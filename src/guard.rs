//! Release-on-drop wrapper for pointers.
//!
//! The span is recorded when the guard leaves scope, including early returns
//! through `?`.

use std::fmt;

use crate::cursor::Pointer;
use crate::frame::{NO_PARENT, UNKNOWN_OPERATION};

/// A pointer that releases itself when dropped.
pub struct ReleaseGuard<P: Pointer> {
    pointer: Option<P>,
}

impl<P: Pointer> ReleaseGuard<P> {
    pub fn new(pointer: P) -> Self {
        Self {
            pointer: Some(pointer),
        }
    }

    /// Take the pointer back without releasing it.
    pub fn into_inner(mut self) -> Option<P> {
        self.pointer.take()
    }
}

impl<P: Pointer> Drop for ReleaseGuard<P> {
    fn drop(&mut self) {
        if let Some(pointer) = self.pointer.take() {
            pointer.release();
        }
    }
}

impl<P: Pointer> Pointer for ReleaseGuard<P> {
    fn operation(&self) -> &str {
        self.pointer
            .as_ref()
            .map_or(UNKNOWN_OPERATION, |p| p.operation())
    }

    fn parent(&self) -> &str {
        self.pointer.as_ref().map_or(NO_PARENT, |p| p.parent())
    }

    fn last_error(&self) -> Option<&str> {
        self.pointer.as_ref().and_then(|p| p.last_error())
    }

    #[track_caller]
    fn observe_error<E: fmt::Display>(&mut self, err: E) -> E {
        match self.pointer.as_mut() {
            Some(pointer) => pointer.observe_error(err),
            None => err,
        }
    }

    #[track_caller]
    fn print_error(&self, err: &dyn fmt::Display) {
        if let Some(pointer) = &self.pointer {
            pointer.print_error(err);
        }
    }

    fn release(self) {
        drop(self);
    }
}

impl<P: Pointer + fmt::Debug> fmt::Debug for ReleaseGuard<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseGuard")
            .field("pointer", &self.pointer)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingPointer {
        released: Arc<AtomicUsize>,
        err: Option<String>,
    }

    impl Pointer for CountingPointer {
        fn operation(&self) -> &str {
            "counting"
        }

        fn parent(&self) -> &str {
            "caller"
        }

        fn last_error(&self) -> Option<&str> {
            self.err.as_deref()
        }

        fn observe_error<E: fmt::Display>(&mut self, err: E) -> E {
            self.err = Some(err.to_string());
            err
        }

        fn print_error(&self, _err: &dyn fmt::Display) {}

        fn release(self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (CountingPointer, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        (
            CountingPointer {
                released: released.clone(),
                err: None,
            },
            released,
        )
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (pointer, released) = counting();
        {
            let guard = pointer.into_guard();
            assert_eq!(guard.operation(), "counting");
            assert_eq!(guard.parent(), "caller");
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_once_on_early_return() {
        fn fails(pointer: CountingPointer) -> Result<(), String> {
            let mut guard = pointer.into_guard();
            guard.observe(Err::<(), _>("early".to_string()))?;
            Ok(())
        }

        let (pointer, released) = counting();
        assert!(fails(pointer).is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_explicit_release() {
        let (pointer, released) = counting();
        let mut guard = ReleaseGuard::new(pointer);
        let _ = guard.observe_error("boom");
        assert_eq!(guard.last_error(), Some("boom"));
        guard.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_inner_skips_release() {
        let (pointer, released) = counting();
        let pointer = ReleaseGuard::new(pointer).into_inner().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 0);
        pointer.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
