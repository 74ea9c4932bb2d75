//! Worker directory adapters.

pub mod file;
pub mod static_list;

pub use file::FileWorkerDirectory;
pub use static_list::StaticWorkerDirectory;
