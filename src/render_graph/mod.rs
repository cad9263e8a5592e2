//! Render Graph System
//!
//! Passes declare the resources they read and write; compilation orders them
//! and rejects passes that would sample a texture they are rendering into.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
