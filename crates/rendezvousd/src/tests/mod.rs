//! Test suites for the rendezvous coordination subsystem.

pub(crate) mod support;
