pub mod data;
pub mod io;
pub mod paths;

pub use data::Config;
pub use io::ConfigError;
pub use paths::AppPaths;

#[cfg(test)]
pub mod tests;
