/// Filesystem adapters for file I/O operations
mod cve_list_directory;

pub use cve_list_directory::CveListDirectory;
