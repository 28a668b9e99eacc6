//! Console front ends: line grammar, prompted input, reply rendering and the
//! client/server command loops.

pub mod console;
pub mod grammar;
pub mod input;
pub mod render;

pub use console::{ServerConsole, run_client};
pub use grammar::{ConsoleLine, RecordCommand, parse_line};
pub use input::{Console, read_marine};
pub use render::{Output, render};
