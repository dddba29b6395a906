//! Lazy, call-triggered lifecycle management for SSH-tunnelled connections.
//!
//! A client object is wrapped together with an SSH tunnel to the endpoint it
//! talks to. The tunnel is opened before the client is built and then kept
//! open, reopened or closed around the client's calls according to a
//! [`MethodChecker`](ssh::MethodChecker). See [`ssh::tunnelable`].

pub mod ssh;

pub use ssh::{
    DefaultMethodChecker, MethodChecker, SshError, SshSettings, TunnelableFactory, Tunnelled,
};
