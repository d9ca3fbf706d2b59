//! Parameter Protocol
//!
//! Agents expose named parameters that are read and written with
//! `ParameterReq` messages. A request names one parameter (`param`/`value`),
//! several (`requests: [{param, value}]`) or none (list everything), plus an
//! optional `index` for indexed parameters. The agent answers INFORM with
//! `param`/`value` and, for several parameters, a `values` map keyed by
//! qualified parameter name.

use crate::agent_id::AgentId;
use crate::message::{short_name, Message, MessageClass, Performative};
use crate::{GatewayError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const PARAMETER_REQ: &str = "org.arl.fjage.param.ParameterReq";
pub const PARAMETER_RSP: &str = "org.arl.fjage.param.ParameterRsp";

/// Index used for non-indexed parameters
pub const NO_INDEX: i32 = -1;
/// Default freshness window of cached parameter values
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(5_000);

pub static PARAMETER_REQ_CLASS: Lazy<Arc<MessageClass>> =
    Lazy::new(|| MessageClass::declare(PARAMETER_REQ));
pub static PARAMETER_RSP_CLASS: Lazy<Arc<MessageClass>> =
    Lazy::new(|| MessageClass::declare(PARAMETER_RSP));

/// Which parameters a get addresses
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSelector {
    Named(String),
    List(Vec<String>),
    /// Every parameter of the agent
    All,
}

/// Result of a get, shaped like its selector
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValues {
    Named(Option<Value>),
    List(Vec<Option<Value>>),
    All(Option<Map<String, Value>>),
}

impl ParamValues {
    /// Null-shaped result for `selector`
    pub fn empty(selector: &ParamSelector) -> Self {
        match selector {
            ParamSelector::Named(_) => ParamValues::Named(None),
            ParamSelector::List(names) => ParamValues::List(vec![None; names.len()]),
            ParamSelector::All => ParamValues::All(None),
        }
    }

    pub fn into_named(self) -> Option<Value> {
        match self {
            ParamValues::Named(v) => v,
            ParamValues::List(values) => values.into_iter().next().flatten(),
            ParamValues::All(_) => None,
        }
    }

    pub fn into_list(self) -> Vec<Option<Value>> {
        match self {
            ParamValues::Named(v) => vec![v],
            ParamValues::List(values) => values,
            ParamValues::All(map) => map
                .map(|m| m.into_iter().map(|(_, v)| Some(v)).collect())
                .unwrap_or_default(),
        }
    }

    pub fn into_map(self) -> Option<Map<String, Value>> {
        match self {
            ParamValues::All(map) => map,
            _ => None,
        }
    }

    /// True if nothing came back
    pub fn is_all_null(&self) -> bool {
        match self {
            ParamValues::Named(v) => v.is_none(),
            ParamValues::List(values) => values.iter().all(Option::is_none),
            ParamValues::All(map) => map.is_none(),
        }
    }
}

/// Per-call knobs for parameter access
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamOptions {
    /// Parameter index, [`NO_INDEX`] for plain parameters
    pub index: i32,
    /// Reply timeout; the gateway's `param_timeout_ms` when `None`
    pub timeout: Option<Duration>,
    /// Accept cached values younger than this; zero disables the cache
    pub max_age: Duration,
}

impl Default for ParamOptions {
    fn default() -> Self {
        Self {
            index: NO_INDEX,
            timeout: None,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl ParamOptions {
    pub fn indexed(index: i32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }
}

/// Something whose parameters can be read and written remotely
#[async_trait]
pub trait ParameterAccessible: Send + Sync {
    async fn get_params(&self, selector: ParamSelector, options: ParamOptions) -> Result<ParamValues>;

    /// Assign values; returns the values the agent confirmed, in order
    async fn set_params(
        &self,
        assignments: Vec<(String, Value)>,
        options: ParamOptions,
    ) -> Result<Vec<Option<Value>>>;

    async fn get(&self, name: &str) -> Result<Option<Value>> {
        let values = self
            .get_params(ParamSelector::Named(name.to_string()), ParamOptions::default())
            .await?;
        Ok(values.into_named())
    }

    async fn get_many(&self, names: &[&str]) -> Result<Vec<Option<Value>>> {
        let names = names.iter().map(|n| n.to_string()).collect();
        let values = self
            .get_params(ParamSelector::List(names), ParamOptions::default())
            .await?;
        Ok(values.into_list())
    }

    /// Every parameter, keyed by qualified name
    async fn get_all(&self) -> Result<Option<Map<String, Value>>> {
        let values = self
            .get_params(ParamSelector::All, ParamOptions::default())
            .await?;
        Ok(values.into_map())
    }

    async fn set(&self, name: &str, value: Value) -> Result<Option<Value>> {
        let confirmed = self
            .set_params(vec![(name.to_string(), value)], ParamOptions::default())
            .await?;
        Ok(confirmed.into_iter().next().flatten())
    }

    async fn set_many(&self, assignments: Vec<(String, Value)>) -> Result<Vec<Option<Value>>> {
        self.set_params(assignments, ParamOptions::default()).await
    }
}

/// Build a `ParameterReq` for `entries` (`None` lists all parameters)
pub(crate) fn build_request(entries: Option<&[(String, Option<Value>)]>, index: i32) -> Message {
    let mut req = PARAMETER_REQ_CLASS.message().with("index", index);
    match entries {
        Some([(param, value)]) => {
            req.set("param", param.as_str());
            if let Some(value) = value {
                req.set("value", value.clone());
            }
        }
        Some(entries) => {
            let requests: Vec<Value> = entries
                .iter()
                .map(|(param, value)| match value {
                    Some(value) => json!({"param": param, "value": value}),
                    None => json!({"param": param}),
                })
                .collect();
            req.set("requests", requests);
        }
        None => {}
    }
    req
}

/// All values in a response: the `values` map merged with `param`/`value`
pub(crate) fn merged_values(rsp: &Message) -> Map<String, Value> {
    let mut values = rsp
        .get("values")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(param) = rsp.get("param").and_then(Value::as_str) {
        values.insert(
            param.to_string(),
            rsp.fields().get("value").cloned().unwrap_or(Value::Null),
        );
    }
    values
}

/// Find the value for `name` among qualified keys.
///
/// The first key ending with the short name wins, so `power` may match
/// `org.arl.unet.phy.maxPower`.
pub(crate) fn lookup_value(values: &Map<String, Value>, name: &str) -> Option<Value> {
    let short = short_name(name);
    values
        .iter()
        .find(|(key, _)| key.ends_with(short))
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_null())
}

fn is_valid_response(rsp: &Message, expect_param: bool) -> bool {
    rsp.is_instance_of(&PARAMETER_RSP_CLASS)
        && rsp.perf == Some(Performative::Inform)
        && (!expect_param || rsp.get("param").is_some())
}

fn describe(names: &[String]) -> String {
    if names.is_empty() {
        "*".to_string()
    } else {
        names.join(",")
    }
}

impl AgentId {
    async fn parameter_exchange(
        &self,
        entries: Option<&[(String, Option<Value>)]>,
        options: ParamOptions,
    ) -> Result<Option<Message>> {
        let gateway = self.gateway()?;
        let timeout = options
            .timeout
            .unwrap_or_else(|| gateway.config().param_timeout());
        let req = build_request(entries, options.index);
        let rsp = self.request(req, timeout).await?;
        Ok(rsp.filter(|rsp| is_valid_response(rsp, entries.is_some())))
    }

    fn parameter_failure<T>(&self, names: &[String], what: &str, empty: T) -> Result<T> {
        let gateway = self.gateway()?;
        warn!(agent = %self.to_wire(), params = %describe(names), "Unable to {} parameters", what);
        if gateway.config().return_null_on_failure {
            Ok(empty)
        } else {
            Err(GatewayError::parameter(
                describe(names),
                format!("unable to {} parameters on {}", what, self.to_wire()),
            ))
        }
    }
}

#[async_trait]
impl ParameterAccessible for AgentId {
    async fn get_params(&self, selector: ParamSelector, options: ParamOptions) -> Result<ParamValues> {
        let (names, entries): (Vec<String>, Option<Vec<(String, Option<Value>)>>) = match &selector {
            ParamSelector::Named(name) => (vec![name.clone()], Some(vec![(name.clone(), None)])),
            ParamSelector::List(names) => (
                names.clone(),
                Some(names.iter().map(|n| (n.clone(), None)).collect()),
            ),
            ParamSelector::All => (Vec::new(), None),
        };

        let Some(rsp) = self.parameter_exchange(entries.as_deref(), options).await? else {
            return self.parameter_failure(&names, "get", ParamValues::empty(&selector));
        };

        debug!(agent = %self.to_wire(), rsp = %rsp, "Parameter response");
        let values = match selector {
            ParamSelector::Named(_) => ParamValues::Named(rsp.get("value").cloned()),
            ParamSelector::List(names) => {
                let merged = merged_values(&rsp);
                ParamValues::List(names.iter().map(|n| lookup_value(&merged, n)).collect())
            }
            ParamSelector::All => ParamValues::All(Some(merged_values(&rsp))),
        };
        Ok(values)
    }

    async fn set_params(
        &self,
        assignments: Vec<(String, Value)>,
        options: ParamOptions,
    ) -> Result<Vec<Option<Value>>> {
        let names: Vec<String> = assignments.iter().map(|(n, _)| n.clone()).collect();
        let entries: Vec<(String, Option<Value>)> = assignments
            .iter()
            .map(|(n, v)| (n.clone(), Some(v.clone())))
            .collect();

        let Some(rsp) = self.parameter_exchange(Some(&entries), options).await? else {
            return self.parameter_failure(&names, "set", vec![None; names.len()]);
        };

        let confirmed: Vec<Option<Value>> = if assignments.len() == 1 {
            vec![rsp.get("value").cloned()]
        } else {
            let merged = merged_values(&rsp);
            names.iter().map(|n| lookup_value(&merged, n)).collect()
        };

        for ((name, requested), confirmed) in assignments.iter().zip(&confirmed) {
            if confirmed.as_ref() != Some(requested) {
                warn!(
                    agent = %self.to_wire(),
                    param = %name,
                    requested = %requested,
                    confirmed = ?confirmed,
                    "Parameter set to a different value than requested"
                );
            }
        }
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request_shape() {
        let req = build_request(Some(&[("MTU".to_string(), None)]), NO_INDEX);
        assert_eq!(req.clazz(), PARAMETER_REQ);
        assert_eq!(req.get("param"), Some(&json!("MTU")));
        assert_eq!(req.get("index"), Some(&json!(-1)));
        assert!(!req.has("value"));
        assert!(!req.has("requests"));
    }

    #[test]
    fn test_batch_request_shape() {
        let entries = vec![
            ("powerLevel".to_string(), Some(json!(-10))),
            ("frameLength".to_string(), None),
        ];
        let req = build_request(Some(&entries), 2);
        assert_eq!(
            req.get("requests"),
            Some(&json!([{"param": "powerLevel", "value": -10}, {"param": "frameLength"}]))
        );
        assert_eq!(req.get("index"), Some(&json!(2)));
        assert!(!req.has("param"));
    }

    #[test]
    fn test_list_all_request_has_no_param() {
        let req = build_request(None, NO_INDEX);
        assert!(!req.has("param"));
        assert!(!req.has("requests"));
    }

    #[test]
    fn test_merged_values_and_suffix_lookup() {
        let rsp = Message::of_class(PARAMETER_RSP)
            .with_perf(Performative::Inform)
            .with("param", "org.arl.unet.phy.Physical.MTU")
            .with("value", 64)
            .with(
                "values",
                json!({"org.arl.unet.phy.Physical.rxEnable": true, "org.arl.unet.phy.Physical.dataRate": null}),
            );
        let merged = merged_values(&rsp);
        assert_eq!(merged.len(), 3);
        assert_eq!(lookup_value(&merged, "MTU"), Some(json!(64)));
        assert_eq!(lookup_value(&merged, "org.arl.unet.phy.Physical.rxEnable"), Some(json!(true)));
        assert_eq!(lookup_value(&merged, "dataRate"), None);
        assert_eq!(lookup_value(&merged, "missing"), None);
    }

    #[test]
    fn test_response_validation() {
        let ok = Message::of_class(PARAMETER_RSP)
            .with_perf(Performative::Inform)
            .with("param", "x");
        assert!(is_valid_response(&ok, true));
        let refused = Message::of_class(PARAMETER_RSP).with_perf(Performative::Refuse);
        assert!(!is_valid_response(&refused, false));
        let bare = Message::of_class(PARAMETER_RSP).with_perf(Performative::Inform);
        assert!(!is_valid_response(&bare, true));
        assert!(is_valid_response(&bare, false));
        let other = Message::new().with_perf(Performative::Inform).with("param", "x");
        assert!(!is_valid_response(&other, true));
    }

    #[test]
    fn test_null_shapes() {
        assert_eq!(
            ParamValues::empty(&ParamSelector::List(vec!["a".into(), "b".into()])),
            ParamValues::List(vec![None, None])
        );
        assert!(ParamValues::empty(&ParamSelector::All).is_all_null());
    }
}
