pub mod harness_utils;
pub mod signals;
pub mod sync_primitives;
