//! `engines` crate: the `EnhancementEngine` trait and its test double.
//!
//! Every enhancement engine must implement [`EnhancementEngine`]. The chain
//! crate plans and dispatches execution through this trait object.

pub mod error;
pub mod traits;
pub mod mock;

pub use error::EngineError;
pub use traits::{
    ContentItem, EnhancementContext, EnhancementEngine, EnhancementProperties, ORDERING_DEFAULT,
};
