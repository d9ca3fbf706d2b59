//! Caching Overlay
//!
//! [`CachingAgentId`] remembers parameter values per index and serves
//! fresh ones without a round trip. In greedy mode a miss fetches every
//! parameter of the agent in one request, so neighbouring reads hit the
//! cache. [`CachingGateway`] hands out caching ids by default.

use crate::agent_id::AgentId;
use crate::gateway::Gateway;
use crate::message::short_name;
use crate::param::{ParamOptions, ParamSelector, ParamValues, ParameterAccessible};
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Parameters always fetched individually, never through a greedy bulk read
pub const SPECIAL_PARAMS: [&str; 2] = ["name", "version"];

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fetched_at: Instant,
}

type ParamCache = HashMap<i32, HashMap<String, CacheEntry>>;

/// Agent id with a parameter cache
#[derive(Clone)]
pub struct CachingAgentId {
    agent: AgentId,
    greedy: bool,
    cache: Arc<Mutex<ParamCache>>,
}

impl CachingAgentId {
    pub fn new(agent: AgentId, greedy: bool) -> Self {
        Self {
            agent,
            greedy,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    /// Forget every cached value
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn cached(&self, name: &str, index: i32, options: &ParamOptions) -> Option<Value> {
        if options.max_age.is_zero() {
            return None;
        }
        let cache = self.cache.lock();
        let entry = cache.get(&index)?.get(short_name(name))?;
        (entry.fetched_at.elapsed() <= options.max_age).then(|| entry.value.clone())
    }

    /// Cached values for the whole selector, or `None` on any miss
    fn lookup(&self, selector: &ParamSelector, options: &ParamOptions) -> Option<ParamValues> {
        match selector {
            ParamSelector::Named(name) => self
                .cached(name, options.index, options)
                .map(|v| ParamValues::Named(Some(v))),
            ParamSelector::List(names) => names
                .iter()
                .map(|n| self.cached(n, options.index, options).map(Some))
                .collect::<Option<Vec<_>>>()
                .map(ParamValues::List),
            ParamSelector::All => None,
        }
    }

    fn store<'a>(&self, index: i32, values: impl IntoIterator<Item = (&'a str, &'a Value)>) {
        let now = Instant::now();
        let mut cache = self.cache.lock();
        let slot = cache.entry(index).or_default();
        for (name, value) in values {
            if value.is_null() {
                continue;
            }
            slot.insert(
                short_name(name).to_string(),
                CacheEntry {
                    value: value.clone(),
                    fetched_at: now,
                },
            );
        }
    }

    fn update_cache(&self, selector: &ParamSelector, values: &ParamValues, index: i32) {
        if values.is_all_null() {
            return;
        }
        match (selector, values) {
            (ParamSelector::Named(name), ParamValues::Named(Some(value))) => {
                self.store(index, [(name.as_str(), value)]);
            }
            (ParamSelector::List(names), ParamValues::List(list)) => {
                self.store(
                    index,
                    names
                        .iter()
                        .zip(list)
                        .filter_map(|(n, v)| v.as_ref().map(|v| (n.as_str(), v))),
                );
            }
            (ParamSelector::All, ParamValues::All(Some(map))) => {
                self.store(index, map.iter().map(|(k, v)| (k.as_str(), v)));
            }
            _ => {}
        }
    }

    fn wants_greedy(&self, selector: &ParamSelector) -> bool {
        if !self.greedy {
            return false;
        }
        match selector {
            ParamSelector::Named(name) => !SPECIAL_PARAMS.contains(&name.as_str()),
            ParamSelector::List(names) => {
                !names.iter().any(|n| SPECIAL_PARAMS.contains(&n.as_str()))
            }
            ParamSelector::All => false,
        }
    }
}

fn pick(all: &Map<String, Value>, name: &str) -> Option<Value> {
    let wanted = short_name(name);
    all.iter()
        .find(|(key, _)| short_name(key) == wanted)
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_null())
}

#[async_trait]
impl ParameterAccessible for CachingAgentId {
    async fn get_params(&self, selector: ParamSelector, options: ParamOptions) -> Result<ParamValues> {
        if let Some(hit) = self.lookup(&selector, &options) {
            debug!(agent = %self.agent.to_wire(), ?selector, "Parameter cache hit");
            return Ok(hit);
        }

        if self.wants_greedy(&selector) {
            let all = self
                .agent
                .get_params(ParamSelector::All, options)
                .await?;
            self.update_cache(&ParamSelector::All, &all, options.index);
            let Some(map) = all.into_map() else {
                return Ok(ParamValues::empty(&selector));
            };
            let values = match selector {
                ParamSelector::Named(name) => ParamValues::Named(pick(&map, &name)),
                ParamSelector::List(names) => {
                    ParamValues::List(names.iter().map(|n| pick(&map, n)).collect())
                }
                ParamSelector::All => ParamValues::All(Some(map)),
            };
            return Ok(values);
        }

        let values = self.agent.get_params(selector.clone(), options).await?;
        self.update_cache(&selector, &values, options.index);
        Ok(values)
    }

    async fn set_params(
        &self,
        assignments: Vec<(String, Value)>,
        options: ParamOptions,
    ) -> Result<Vec<Option<Value>>> {
        let names: Vec<String> = assignments.iter().map(|(n, _)| n.clone()).collect();
        let confirmed = self.agent.set_params(assignments, options).await?;
        self.update_cache(
            &ParamSelector::List(names),
            &ParamValues::List(confirmed.clone()),
            options.index,
        );
        Ok(confirmed)
    }
}

impl std::fmt::Debug for CachingAgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingAgentId")
            .field("agent", &self.agent)
            .field("greedy", &self.greedy)
            .finish()
    }
}

impl Deref for CachingAgentId {
    type Target = AgentId;

    fn deref(&self) -> &AgentId {
        &self.agent
    }
}

/// Gateway handing out [`CachingAgentId`]s
#[derive(Clone, Debug)]
pub struct CachingGateway {
    gateway: Gateway,
}

impl CachingGateway {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Greedy caching id for the agent `name`
    pub fn agent(&self, name: &str) -> CachingAgentId {
        self.agent_with(name, true)
    }

    pub fn agent_with(&self, name: &str, greedy: bool) -> CachingAgentId {
        CachingAgentId::new(self.gateway.agent(name), greedy)
    }

    /// Plain id without a cache
    pub fn agent_uncached(&self, name: &str) -> AgentId {
        self.gateway.agent(name)
    }

    pub fn topic(&self, name: &str) -> CachingAgentId {
        CachingAgentId::new(self.gateway.topic(name), true)
    }

    pub fn topic_uncached(&self, name: &str) -> AgentId {
        self.gateway.topic(name)
    }

    pub async fn agent_for_service(&self, service: &str) -> Result<Option<CachingAgentId>> {
        self.agent_for_service_with(service, true).await
    }

    pub async fn agent_for_service_with(
        &self,
        service: &str,
        greedy: bool,
    ) -> Result<Option<CachingAgentId>> {
        let agent = self.gateway.agent_for_service(service).await?;
        Ok(agent.map(|a| CachingAgentId::new(a, greedy)))
    }

    pub async fn agents_for_service(&self, service: &str) -> Result<Vec<CachingAgentId>> {
        self.agents_for_service_with(service, true).await
    }

    pub async fn agents_for_service_with(
        &self,
        service: &str,
        greedy: bool,
    ) -> Result<Vec<CachingAgentId>> {
        let agents = self.gateway.agents_for_service(service).await?;
        Ok(agents
            .into_iter()
            .map(|a| CachingAgentId::new(a, greedy))
            .collect())
    }
}

impl Deref for CachingGateway {
    type Target = Gateway;

    fn deref(&self) -> &Gateway {
        &self.gateway
    }
}

impl From<Gateway> for CachingGateway {
    fn from(gateway: Gateway) -> Self {
        Self::new(gateway)
    }
}
