use std::time::Duration;

use futures_util::FutureExt;
use smsroute_common::{internal, outgoing};
use smsroute_dispatch::{
    SelectionError,
    selection::{
        DomainSelectionConnection, DomainSelectionResolver, SelectionAttributes, SelectionCallback,
        SelectionFuture, SelectorType,
    },
};

use crate::config::{Decision, ResolverScript};

/// Resolver that gives every request the same scripted decision.
#[derive(Debug, Clone)]
pub struct ScriptedResolver {
    decision: Decision,
    latency: Duration,
}

impl ScriptedResolver {
    #[must_use]
    pub fn new(script: &ResolverScript) -> Self {
        Self {
            decision: script.decision.clone(),
            latency: Duration::from_millis(script.latency_ms),
        }
    }
}

impl DomainSelectionResolver for ScriptedResolver {
    fn get_connection(
        &self,
        selector_type: SelectorType,
        is_emergency: bool,
    ) -> Option<Box<dyn DomainSelectionConnection>> {
        if selector_type != SelectorType::Sms {
            return None;
        }

        internal!(is_emergency, "Opening scripted selection connection");
        Some(Box::new(ScriptedConnection {
            decision: self.decision.clone(),
            latency: self.latency,
        }))
    }
}

#[derive(Debug)]
struct ScriptedConnection {
    decision: Decision,
    latency: Duration,
}

impl DomainSelectionConnection for ScriptedConnection {
    fn request_domain_selection(
        &mut self,
        attributes: SelectionAttributes,
        callback: SelectionCallback,
    ) -> Option<SelectionFuture> {
        outgoing!(
            destination = %attributes.destination,
            emergency = attributes.is_emergency,
            decision = ?self.decision,
            "Scripted domain selection"
        );

        let latency = self.latency;
        let future = match self.decision.clone() {
            Decision::Select(domain) => async move {
                tokio::time::sleep(latency).await;
                Ok(domain)
            }
            .boxed(),
            Decision::Fail(reason) => async move {
                tokio::time::sleep(latency).await;
                Err(SelectionError::Failed(reason))
            }
            .boxed(),
            Decision::Terminate(cause) => {
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    callback.on_selection_terminated(cause);
                });
                futures_util::future::pending().boxed()
            }
        };

        Some(future)
    }

    fn finish_selection(&mut self) {
        internal!("Scripted selection finished");
    }
}
