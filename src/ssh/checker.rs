//! Call classification policy.
//!
//! A [`MethodChecker`] decides, per operation name, whether a call needs an
//! open tunnel before it runs or tears the tunnel down after it runs. The
//! operation name is a stable symbolic identifier chosen by whoever forwards
//! calls through [`Tunnelled`](super::tunnelable::Tunnelled), e.g. `"connect"`.

/// Two independent predicates over an operation name.
pub trait MethodChecker: Send + Sync {
    /// The tunnel must be open before `operation` runs.
    fn is_tunnelled(&self, operation: &str) -> bool;

    /// The tunnel is closed after `operation` runs.
    fn is_shutdown(&self, operation: &str) -> bool;
}

impl<C: MethodChecker + ?Sized> MethodChecker for &C {
    fn is_tunnelled(&self, operation: &str) -> bool {
        (**self).is_tunnelled(operation)
    }

    fn is_shutdown(&self, operation: &str) -> bool {
        (**self).is_shutdown(operation)
    }
}

impl<C: MethodChecker + ?Sized> MethodChecker for Box<C> {
    fn is_tunnelled(&self, operation: &str) -> bool {
        (**self).is_tunnelled(operation)
    }

    fn is_shutdown(&self, operation: &str) -> bool {
        (**self).is_shutdown(operation)
    }
}

impl<C: MethodChecker + ?Sized> MethodChecker for std::sync::Arc<C> {
    fn is_tunnelled(&self, operation: &str) -> bool {
        (**self).is_tunnelled(operation)
    }

    fn is_shutdown(&self, operation: &str) -> bool {
        (**self).is_shutdown(operation)
    }
}

/// Operations that ensure the tunnel is open.
pub const TUNNELLED_OPERATIONS: &[&str] = &["connect", "reconnect", "open"];

/// Operations that close the tunnel.
pub const SHUTDOWN_OPERATIONS: &[&str] = &["disconnect", "close", "shutdown"];

/// Classifies by exact name: `connect`, `reconnect` and `open` are
/// tunnelled; `disconnect`, `close` and `shutdown` shut the tunnel down.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMethodChecker;

impl MethodChecker for DefaultMethodChecker {
    fn is_tunnelled(&self, operation: &str) -> bool {
        TUNNELLED_OPERATIONS.contains(&operation)
    }

    fn is_shutdown(&self, operation: &str) -> bool {
        SHUTDOWN_OPERATIONS.contains(&operation)
    }
}

/// What the tunnel has to do around a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Ensure the tunnel is open, then call.
    EnsureOpen,
    /// Call, then close the tunnel whatever the outcome.
    Close,
    /// Call without touching the tunnel.
    PassThrough,
}

impl Intent {
    /// Classify `operation`. Tunnelled wins when a checker reports both.
    pub fn of<C: MethodChecker + ?Sized>(checker: &C, operation: &str) -> Self {
        if checker.is_tunnelled(operation) {
            Intent::EnsureOpen
        } else if checker.is_shutdown(operation) {
            Intent::Close
        } else {
            Intent::PassThrough
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Everything;

    impl MethodChecker for Everything {
        fn is_tunnelled(&self, _operation: &str) -> bool {
            true
        }

        fn is_shutdown(&self, _operation: &str) -> bool {
            true
        }
    }

    mod default_checker {
        use super::*;

        #[test]
        fn test_tunnelled_operations() {
            let checker = DefaultMethodChecker;
            for op in ["connect", "reconnect", "open"] {
                assert!(checker.is_tunnelled(op), "{}", op);
                assert!(!checker.is_shutdown(op), "{}", op);
            }
        }

        #[test]
        fn test_shutdown_operations() {
            let checker = DefaultMethodChecker;
            for op in ["disconnect", "close", "shutdown"] {
                assert!(checker.is_shutdown(op), "{}", op);
                assert!(!checker.is_tunnelled(op), "{}", op);
            }
        }

        #[test]
        fn test_other_operations_pass_through() {
            let checker = DefaultMethodChecker;
            for op in ["query", "Connect", "close_all", ""] {
                assert!(!checker.is_tunnelled(op), "{}", op);
                assert!(!checker.is_shutdown(op), "{}", op);
            }
        }

        #[test]
        fn test_default_sets_do_not_overlap() {
            for op in TUNNELLED_OPERATIONS {
                assert!(!SHUTDOWN_OPERATIONS.contains(op));
            }
        }
    }

    mod intent {
        use super::*;

        #[test]
        fn test_default_intents() {
            let checker = DefaultMethodChecker;
            assert_eq!(Intent::of(&checker, "connect"), Intent::EnsureOpen);
            assert_eq!(Intent::of(&checker, "close"), Intent::Close);
            assert_eq!(Intent::of(&checker, "query"), Intent::PassThrough);
        }

        #[test]
        fn test_tunnelled_takes_precedence() {
            assert_eq!(Intent::of(&Everything, "close"), Intent::EnsureOpen);
        }

        #[test]
        fn test_works_through_pointers() {
            let boxed: Box<dyn MethodChecker> = Box::new(DefaultMethodChecker);
            assert_eq!(Intent::of(&boxed, "open"), Intent::EnsureOpen);

            let shared = std::sync::Arc::new(DefaultMethodChecker);
            assert_eq!(Intent::of(&shared, "shutdown"), Intent::Close);
        }
    }
}
