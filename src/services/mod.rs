//! Service-side read paths.

pub mod product;

pub use product::ProductReader;
