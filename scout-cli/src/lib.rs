//! Library target for the `scout` package.
//!
//! The primary deliverable of this package is the `scout` CLI binary
//! (`src/main.rs`). This library exists so CI can run `cargo test -p scout --doc`
//! against the engine re-export.

#[doc(hidden)]
pub use scout_engine;
