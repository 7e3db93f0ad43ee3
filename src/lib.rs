//! COLLADA (.dae) export for Homeworld Remastered's HODOR, plus the readers
//! that go with it.
//!
//! Callers snapshot their scene into a `scene::Scene`, hand it to
//! `collada::export` together with a `host::SceneHost` for the few things
//! that need live host state (shape keys, frames, actions), and get a
//! document HODOR can consume.

#![recursion_limit = "1024"] // for error_chain and xml!

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

#[macro_use]
pub mod errors;
pub mod collada;
pub mod config;
pub mod host;
pub mod level;
pub mod logger;
pub mod scene;
pub mod util;
