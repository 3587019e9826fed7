//! Domain layer: pure types and text transforms.
//!
//! Nothing here touches the file system, the clock or the script engine, so
//! every rule about keys, profiles and the autogenerated section can be unit
//! tested on plain strings and maps.

pub mod autogen;
pub mod config_map;
pub mod profile;
