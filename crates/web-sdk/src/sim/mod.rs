//! An in-memory browser: document tree, global event target, session
//! history, environment and storage. Drives the tracker in tests and in the
//! `trackkit-sim` replay tool.

mod document;
mod page;
mod selector;
mod window;

pub use document::{ElementSpec, NodeRef, SimDocument};
pub use page::SimPage;
pub use window::{SimEnvironment, SimHistory, SimWindow};
