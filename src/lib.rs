//! Next-fit allocator that manages a single region of memory handed to it
//! once, plus the small list program that uses it.
//!
//! The region is carved into blocks whose headers form a cycle in address
//! order. See [`Heap`] for the algorithm and [`Region`] for a way of getting
//! memory straight from the kernel.

mod align;
mod arena;
mod collection;
mod config;
mod cycle;
mod error;
mod header;
mod heap;
mod platform;
pub mod program;

pub use align::{align, align_down, ALIGNMENT};
pub use collection::{HeapList, Values};
pub use config::{Config, DEFAULT_REGION_SIZE, REGION_SIZE_VAR};
pub use error::{ConfigError, HeapError, ProgramError};
pub use header::{Header, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use heap::{Heap, HeapPtr, HeapStats, MIN_REGION_SIZE};
pub use platform::{page_size, Region};
pub use program::{Command, Commands, Summary};
