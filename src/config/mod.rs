//! Configuration types for the ambit client.
//!
//! This module provides configuration options for:
//! - [`Settings`]: Deployment settings loaded from the environment
//! - [`BatchConfig`]: Event buffering and delivery cadence
//! - [`FlagConfig`]: Feature flag evaluation and caching
//! - [`RetryConfig`]: Retry behavior for transient delivery failures

mod batch;
mod flags;
mod retry;
mod settings;

pub use batch::BatchConfig;
pub use flags::FlagConfig;
pub use retry::RetryConfig;
pub use settings::{
    DEFAULT_HOST, ENV_API_KEY, ENV_DEBUG, ENV_DISABLED, ENV_HOST, ENV_PERSONAL_API_KEY, Settings,
};
