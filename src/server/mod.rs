//! Development broadcast server for the HOT PPL live feed.

pub mod app;
pub mod board;
pub mod hub;

pub use app::router;
pub use board::{Board, Submission};
pub use hub::LiveHub;
