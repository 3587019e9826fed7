//! Infrastructure layer: file access and script evaluation.
//!
//! **Dependency rule**: this layer may depend on `domain`, but MUST NOT be
//! imported by the `domain` layer.

pub mod codec;
pub mod storage;
