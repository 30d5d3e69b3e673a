//! Scripted collaborators shared by the balancer tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use waypoint_core::{
    CallContext, InvocationError, Response, SelectionContext, SelectionCriteria, SelectionEngine,
    SelectionError, ServiceInstance,
};

use super::endpoint::EndpointSelector;
use crate::chain::{Chain, Handler};
use crate::config::RouterConfig;
use crate::strategy::StrategyRegistry;

/// Engine handing out `instances` in turn, one per build. Builds numbered
/// `fail_from` and later fail with `NoInstance`.
pub struct ScriptedEngine {
    pub builds: AtomicU32,
    pub fail_from: Option<u32>,
    pub instances: Vec<ServiceInstance>,
}

impl ScriptedEngine {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            builds: AtomicU32::new(0),
            fail_from: None,
            instances: ids
                .iter()
                .map(|id| {
                    ServiceInstance::new(*id, "orders").with_endpoint("http", format!("{id}:1"))
                })
                .collect(),
        }
    }

    pub fn failing_from(mut self, build: u32) -> Self {
        self.fail_from = Some(build);
        self
    }

    pub fn builds(&self) -> u32 {
        self.builds.load(Ordering::SeqCst)
    }
}

struct Picked(ServiceInstance);

impl SelectionContext for Picked {
    fn pick(&mut self) -> Result<ServiceInstance, SelectionError> {
        Ok(self.0.clone())
    }
}

impl SelectionEngine for ScriptedEngine {
    fn build(
        &self,
        criteria: SelectionCriteria,
    ) -> Result<Box<dyn SelectionContext>, SelectionError> {
        let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.is_some_and(|from| n >= from) || self.instances.is_empty() {
            return Err(SelectionError::NoInstance {
                service: criteria.target_service,
            });
        }
        let idx = (n as usize - 1) % self.instances.len();
        Ok(Box::new(Picked(self.instances[idx].clone())))
    }
}

pub fn selector(config: RouterConfig, engine: Arc<ScriptedEngine>) -> EndpointSelector {
    EndpointSelector::new(
        Arc::new(config),
        Arc::new(StrategyRegistry::with_builtin()),
        engine,
    )
}

/// One downstream call as observed by [`Downstream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub position: usize,
    pub endpoint: String,
}

/// Terminal handler failing every call except the `succeed_on`-th (1-based).
pub struct Downstream {
    pub calls: Arc<Mutex<Vec<Observed>>>,
    pub succeed_on: Option<usize>,
    pub cancel_on: Option<usize>,
}

impl Downstream {
    pub fn failing() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            succeed_on: None,
            cancel_on: None,
        }
    }

    pub fn succeeding_on(call: usize) -> Self {
        Self {
            succeed_on: Some(call),
            ..Self::failing()
        }
    }

    pub fn cancelling_on(call: usize) -> Self {
        Self {
            cancel_on: Some(call),
            ..Self::failing()
        }
    }
}

#[async_trait]
impl Handler for Downstream {
    fn name(&self) -> &'static str {
        "downstream"
    }

    async fn handle(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Observed {
                position: chain.position(),
                endpoint: ctx.endpoint.clone(),
            });
            calls.len()
        };
        if self.cancel_on == Some(n) {
            ctx.cancel.cancel();
        }
        if self.succeed_on == Some(n) {
            Response::ok(format!("ok-{n}"))
        } else {
            Response::from_error(InvocationError::downstream(anyhow::anyhow!("boom-{n}")))
        }
    }
}
