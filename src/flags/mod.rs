//! Feature flags.
//!
//! Flags are resolved in two tiers:
//!
//! 1. **Local evaluation** against definitions loaded with a personal API key
//!    and refreshed once [`FlagConfig::definitions_ttl`](crate::FlagConfig) expires.
//! 2. **Remote decide** for flags the local tier cannot settle (unknown flag,
//!    missing person property, cohort or group conditions), cached per distinct
//!    id, person properties and groups for
//!    [`FlagConfig::decide_ttl`](crate::FlagConfig).
//!
//! Either tier failing resolves to [`FlagValue::Disabled`] with a `warn` log.
//! Flag reads never fail and never touch an [`AnalyticsContext`](crate::AnalyticsContext).

mod definition;
pub mod evaluator;
mod store;

pub use definition::{
    ConditionGroup, DecideRequest, DecideResponse, FlagDefinition, FlagDefinitions, FlagFilters,
    FlagValue, Multivariate, PropertyCondition, Variant,
};
pub(crate) use store::FlagStore;
