//! HOT PPL development server library.
//!
//! The `hotppl-server` binary is a thin wrapper over [`server::router`].

pub mod server;
