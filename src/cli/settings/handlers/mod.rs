//! Setting handlers for different configuration patterns.

pub mod boolean;
pub mod integer;
pub mod model;
pub mod simple;

pub use simple::*;
