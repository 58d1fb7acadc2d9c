//! Test modules for the rpc-dispatch-server crate
//!
//! Exercises the server over real TCP connections.
