//! Image reference handling.
//!
//! - [`reference`] parses raw references and builds globally unique names
//! - [`resolve`] attributes a raw reference to a registry on the allow-list

pub mod reference;
pub mod resolve;

pub use reference::ImageReference;
pub use resolve::{resolve, Resolution};
