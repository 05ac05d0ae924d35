//! Profile module: saved slot bindings and macro configuration

mod model;
mod store;

pub use model::Profile;
pub use store::{ProfileError, ProfileStore};
