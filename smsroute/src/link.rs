use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use smsroute_common::{Domain, incoming};
use smsroute_dispatch::{
    DeliveryCallback, DeliveryReport,
    transport::{LinkResponse, SmsLink, Submission},
};

use crate::config::LinkScript;

/// A link that answers from a script after a fixed latency, and reports
/// every accepted message as delivered.
#[derive(Debug)]
pub struct SimulatedLink {
    domain: Domain,
    available: bool,
    emergency_support: bool,
    latency: Duration,
    responses: Mutex<VecDeque<LinkResponse>>,
}

impl SimulatedLink {
    #[must_use]
    pub fn new(domain: Domain, script: &LinkScript) -> Self {
        Self {
            domain,
            available: script.available,
            emergency_support: script.emergency_support,
            latency: Duration::from_millis(script.latency_ms),
            responses: Mutex::new(script.responses.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl SmsLink for SimulatedLink {
    async fn submit(&self, submission: Submission) -> LinkResponse {
        tokio::time::sleep(self.latency).await;

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(LinkResponse::Accepted);
        incoming!(
            domain = %self.domain,
            destination = %submission.destination,
            message_ref = ?submission.message_ref,
            retry = submission.is_retry,
            ?response,
            "Link answered"
        );

        response
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn is_emergency_sms_support(&self, _destination: &str) -> bool {
        self.emergency_support
    }

    fn register_status_report(&self, message_ref: u8, callback: DeliveryCallback) {
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let _ = callback.send(DeliveryReport {
                message_ref,
                delivered: true,
                status: 0,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use smsroute_common::{ResultCode, SmsFormat};
    use smsroute_dispatch::Payload;

    use super::*;

    fn submission() -> Submission {
        Submission {
            destination: "1111".to_string(),
            service_center: None,
            payload: Payload::Text("text".to_string()),
            message_ref: Some(0),
            is_retry: false,
            is_emergency: false,
            format: SmsFormat::ThreeGpp,
            priority: None,
            validity_period_mins: None,
            expect_more: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answers_from_script_then_accepts() {
        let link = SimulatedLink::new(
            Domain::Ps,
            &LinkScript {
                responses: vec![LinkResponse::Rejected(ResultCode::NetworkReject)],
                latency_ms: 10,
                ..LinkScript::default()
            },
        );

        assert_eq!(
            link.submit(submission()).await,
            LinkResponse::Rejected(ResultCode::NetworkReject)
        );
        assert_eq!(link.submit(submission()).await, LinkResponse::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_are_delivered() {
        let link = SimulatedLink::new(Domain::Cs, &LinkScript::default());
        let (callback, report) = tokio::sync::oneshot::channel();
        link.register_status_report(7, callback);

        let report = report.await.expect("report");
        assert_eq!(report.message_ref, 7);
        assert!(report.delivered);
    }
}
