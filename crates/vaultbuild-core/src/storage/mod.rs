//! Host storage and settings implementations.

mod fs;
mod memory;
mod settings;

pub use fs::FsStorage;
pub use memory::MemoryStorage;
pub use settings::MemorySettings;
