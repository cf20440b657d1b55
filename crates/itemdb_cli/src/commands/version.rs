//! Version command implementation.

/// Prints the CLI and core library versions.
pub fn run() {
    println!("ItemDB CLI v{}", env!("CARGO_PKG_VERSION"));
    println!("ItemDB Core v{}", itemdb_core::VERSION);
}
