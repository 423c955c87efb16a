mod attributes;
mod config;
mod core;
mod error;
mod keys;
mod mapping;
pub mod markup;
mod ops;
mod plugin;
mod plugins;
mod serde_value;
mod session;
mod suggestion;
mod toolbar;

pub use crate::attributes::*;
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::keys::*;
pub use crate::mapping::*;
pub use crate::markup::{parse_html, serialize_html};
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::serde_value::*;
pub use crate::session::*;
pub use crate::suggestion::*;
pub use crate::toolbar::*;
