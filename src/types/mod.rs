pub mod identifiers;

pub use identifiers::ContentHash;
