#![deny(unsafe_op_in_unsafe_fn)]
#![doc = include_str!("../README.md")]

mod cfg;
mod map;
mod raw;

pub use map::{Error, HashMap, HashMapBuilder, HashMapRef};
pub use seize::{Guard, LocalGuard, OwnedGuard};
