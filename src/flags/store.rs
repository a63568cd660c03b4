//! Cached flag definitions and remote decisions.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::definition::{DecideRequest, DecideResponse, FlagDefinition, FlagValue};
use super::evaluator;
use crate::config::FlagConfig;
use crate::transport::TransportClient;
use crate::types::Properties;

/// Upper bound on remembered `$feature_flag_called` combinations.
const MAX_CALLED_ENTRIES: usize = 50_000;

/// Resolves flag values, preferring local definitions over remote decisions.
///
/// No lock is held across an `.await`; fetched data is cloned out of the
/// caches before evaluation.
pub(crate) struct FlagStore {
    transport: Option<Arc<dyn TransportClient>>,
    config: FlagConfig,
    definitions: RwLock<LoadedDefinitions>,
    refresh: tokio::sync::Mutex<()>,
    decisions: Mutex<DecisionCache>,
    called: Mutex<HashSet<(String, String, String)>>,
}

#[derive(Default)]
struct LoadedDefinitions {
    /// `None` when the transport cannot serve definitions.
    flags: Option<HashMap<String, FlagDefinition>>,
    loaded_at: Option<Instant>,
}

/// Decide answers depend on everything sent, not just the distinct id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    distinct_id: String,
    person_properties: String,
    groups: String,
}

impl DecisionKey {
    fn new(distinct_id: &str, person_properties: &Properties, groups: &Properties) -> Self {
        Self {
            distinct_id: distinct_id.to_string(),
            person_properties: canonical(person_properties),
            groups: canonical(groups),
        }
    }
}

/// Order-independent JSON encoding of a property map.
fn canonical(properties: &Properties) -> String {
    let sorted: BTreeMap<&String, &Value> = properties.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

#[derive(Default)]
struct DecisionCache {
    entries: HashMap<DecisionKey, (DecideResponse, Instant)>,
    order: VecDeque<DecisionKey>,
}

/// A resolved flag with its payload.
pub(crate) struct Resolved {
    pub value: FlagValue,
    pub payload: Option<Value>,
}

impl Resolved {
    fn disabled() -> Self {
        Self { value: FlagValue::Disabled, payload: None }
    }
}

impl FlagStore {
    pub(crate) fn new(transport: Option<Arc<dyn TransportClient>>, config: FlagConfig) -> Self {
        Self {
            transport,
            config,
            definitions: RwLock::new(LoadedDefinitions::default()),
            refresh: tokio::sync::Mutex::new(()),
            decisions: Mutex::new(DecisionCache::default()),
            called: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn config(&self) -> &FlagConfig {
        &self.config
    }

    /// Resolves `key` for `distinct_id`.
    ///
    /// Transport failures resolve to disabled and are logged at `warn`.
    pub(crate) async fn resolve(
        &self,
        key: &str,
        distinct_id: &str,
        person_properties: &Properties,
        groups: &Properties,
    ) -> Resolved {
        if self.transport.is_none() {
            return Resolved::disabled();
        }

        if let Some(definition) = self.local_definition(key).await {
            match evaluator::evaluate(&definition, distinct_id, person_properties) {
                Ok(value) => {
                    let payload = value.payload_key().and_then(|k| definition.payload(k));
                    return Resolved { value, payload };
                },
                Err(reason) => {
                    tracing::debug!(flag = key, %reason, "falling back to remote flag evaluation");
                },
            }
        }

        match self.decide(distinct_id, person_properties, groups).await {
            Some(response) => {
                let value = response.value(key);
                let payload = if value.is_enabled() { response.payload(key) } else { None };
                Resolved { value, payload }
            },
            None => Resolved::disabled(),
        }
    }

    /// Records a flag read, returning `true` the first time a
    /// (flag, distinct id, value) combination is seen.
    pub(crate) fn first_call(&self, key: &str, distinct_id: &str, value: &FlagValue) -> bool {
        let mut called = self.called.lock();
        if called.len() >= MAX_CALLED_ENTRIES {
            called.clear();
        }
        called.insert((key.to_string(), distinct_id.to_string(), value.to_string()))
    }

    /// Reloads definitions now, regardless of their age.
    pub(crate) async fn reload(&self) {
        let _guard = self.refresh.lock().await;
        self.load_definitions().await;
    }

    /// Number of locally known flag definitions.
    pub(crate) fn local_flag_count(&self) -> usize {
        self.definitions.read().flags.as_ref().map_or(0, HashMap::len)
    }

    async fn local_definition(&self, key: &str) -> Option<FlagDefinition> {
        if !self.config.local_evaluation {
            return None;
        }
        if self.definitions_stale() {
            let _guard = self.refresh.lock().await;
            // Another caller may have refreshed while we waited.
            if self.definitions_stale() {
                self.load_definitions().await;
            }
        }
        self.definitions.read().flags.as_ref().and_then(|flags| flags.get(key).cloned())
    }

    fn definitions_stale(&self) -> bool {
        match self.definitions.read().loaded_at {
            Some(at) => at.elapsed() >= self.config.definitions_ttl,
            None => true,
        }
    }

    async fn load_definitions(&self) {
        let Some(ref transport) = self.transport else {
            return;
        };

        let result = transport.load_flag_definitions().await;
        let mut loaded = self.definitions.write();
        loaded.loaded_at = Some(Instant::now());
        match result {
            Ok(Some(definitions)) => {
                tracing::debug!(count = definitions.flags.len(), "loaded flag definitions");
                loaded.flags =
                    Some(definitions.flags.into_iter().map(|f| (f.key.clone(), f)).collect());
            },
            Ok(None) => loaded.flags = None,
            Err(error) => {
                tracing::warn!(%error, "failed to load flag definitions, keeping previous set");
            },
        }
    }

    async fn decide(
        &self,
        distinct_id: &str,
        person_properties: &Properties,
        groups: &Properties,
    ) -> Option<DecideResponse> {
        let transport = self.transport.as_ref()?;
        let ttl = self.config.decide_ttl;
        let key = DecisionKey::new(distinct_id, person_properties, groups);

        if !ttl.is_zero() {
            let cache = self.decisions.lock();
            let fresh = cache.entries.get(&key).filter(|(_, at)| at.elapsed() < ttl);
            if let Some((response, _)) = fresh {
                return Some(response.clone());
            }
        }

        let request = DecideRequest {
            distinct_id: distinct_id.to_string(),
            person_properties: person_properties.clone(),
            groups: groups.clone(),
        };

        match transport.decide(request).await {
            Ok(response) => {
                if !ttl.is_zero() {
                    self.remember(key, response.clone());
                }
                Some(response)
            },
            Err(error) => {
                tracing::warn!(%error, distinct_id, "remote flag evaluation failed");
                None
            },
        }
    }

    fn remember(&self, key: DecisionKey, response: DecideResponse) {
        let mut cache = self.decisions.lock();
        if cache.entries.insert(key.clone(), (response, Instant::now())).is_none() {
            cache.order.push_back(key);
        }
        while cache.entries.len() > self.config.max_cached_identities.max(1) {
            match cache.order.pop_front() {
                Some(oldest) => {
                    cache.entries.remove(&oldest);
                },
                None => break,
            }
        }
    }
}
