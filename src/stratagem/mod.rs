//! Stratagem module: direction sequences and the template store

mod store;
mod template;

pub use store::TemplateStore;
pub use template::{Direction, StratagemTemplate, TemplateError};
