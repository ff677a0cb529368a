//! Routing scenarios for the dispatch controller, driven one command at a
//! time through the test harness.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use smsroute_common::{Domain, ResultCode, SendResult, SmsFormat, TrafficClass};
use smsroute_dispatch::{
    Command, DispatchError, DispatchEvent, MessageTracker, RejectReason, SelectionError, SendOptions,
    SendRequest, SequenceCounter,
    selection::{ConnectionId, DomainSelectionResolver, HolderState},
    testing::{ConnectionMode, EndedSms, MockResolver, RecordingDispatcher},
    transport::TransportOutcome,
};
use support::{Harness, text};
use tokio::sync::oneshot;

fn message_ids(dispatcher: &RecordingDispatcher) -> Vec<u64> {
    dispatcher
        .records()
        .iter()
        .map(|record| record.message_id)
        .collect()
}

#[tokio::test]
async fn first_send_opens_a_selection_and_resolves_over_ps() {
    let mut harness = Harness::new();

    let mut request = text("1111", "text", 1).service_center("2222");
    let sent = request.on_sent();
    harness.controller.send_text(request).expect("accepted");

    assert_eq!(harness.resolver.get_connection_calls(), 1);
    assert_eq!(harness.resolver.request_count(), 1);
    assert_eq!(harness.normal().pending_requests().len(), 1);
    assert!(harness.normal().get_connection().is_some());
    assert!(harness.normal().is_domain_selection_requested());
    assert_eq!(harness.ps.sent_count(), 0);

    let connection = harness.resolver.latest().expect("connection");
    assert!(connection.complete(Domain::Ps));
    harness.settle().await;

    let records = harness.ps.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].destination, "1111");
    assert_eq!(records[0].message_ref, Some(0));
    assert_eq!(connection.finish_count(), 1);
    assert!(harness.normal().get_connection().is_none());
    assert_eq!(harness.normal().pending_requests().len(), 0);
    assert_eq!(harness.normal().state(), HolderState::Idle);

    harness
        .ps
        .take_held()
        .pop()
        .expect("held send")
        .report(TransportOutcome::Sent);
    harness.settle().await;

    assert_eq!(
        sent.await.expect("result"),
        SendResult::Sent {
            message_ref: Some(0)
        }
    );
}

#[tokio::test]
async fn sends_queue_behind_the_outstanding_selection_and_drain_in_order() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    harness.controller.send_text(text("1111", "r2", 2)).unwrap();
    assert_eq!(harness.normal().pending_requests().len(), 2);
    harness.controller.send_text(text("1111", "r3", 3)).unwrap();

    assert_eq!(harness.resolver.get_connection_calls(), 1);
    assert_eq!(harness.resolver.request_count(), 1);
    let queued: Vec<_> = harness
        .normal()
        .pending_requests()
        .iter()
        .map(|request| request.tracker.message_id())
        .collect();
    assert_eq!(queued, [1, 2, 3]);

    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;

    assert_eq!(message_ids(&harness.ps), [1, 2, 3]);
    let refs: Vec<_> = harness
        .ps
        .records()
        .iter()
        .map(|record| record.message_ref)
        .collect();
    assert_eq!(refs, [Some(0), Some(1), Some(2)]);
    assert_eq!(harness.cs_3gpp.sent_count(), 0);
}

#[tokio::test]
async fn cs_decision_uses_the_voice_technology_dispatcher() {
    let mut harness = Harness::builder()
        .with_voice_format(SmsFormat::ThreeGpp2)
        .build();

    harness.controller.send_text(text("1111", "text", 1)).unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Cs);
    harness.settle().await;

    assert_eq!(harness.cs_3gpp2.sent_count(), 1);
    assert_eq!(harness.cs_3gpp.sent_count(), 0);
    assert_eq!(harness.ps.sent_count(), 0);
}

#[tokio::test]
async fn fallback_keeps_the_message_ref_and_does_not_consume_a_new_one() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "first", 1)).unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;
    let first = harness.ps.take_held().pop().unwrap();

    harness.controller.send_text(text("2222", "second", 2)).unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;

    first.report(TransportOutcome::Fallback);
    harness.settle().await;

    let cs = harness.cs_3gpp.records();
    assert_eq!(cs.len(), 1);
    assert_eq!(cs[0].message_id, 1);
    assert_eq!(cs[0].message_ref, Some(0));

    let ps = harness.ps.records();
    assert_eq!(ps[1].message_id, 2);
    assert_eq!(ps[1].message_ref, Some(1));

    // The fallback went straight to CS.
    assert_eq!(harness.resolver.get_connection_calls(), 2);
    assert_eq!(harness.controller.sequence().peek(), 2);
}

#[tokio::test]
async fn retry_after_ims_skips_domain_selection() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "text", 1)).unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;

    let held = harness.ps.take_held().pop().unwrap();
    assert!(held.tracker.uses_ims_service_for_ims());
    held.report(TransportOutcome::RetryRequested);
    harness.settle().await;

    assert_eq!(harness.resolver.get_connection_calls(), 1);
    assert_eq!(harness.resolver.request_count(), 1);
    let cs = harness.cs_3gpp.records();
    assert_eq!(cs.len(), 1);
    assert_eq!(cs[0].message_ref, Some(0));
}

#[tokio::test]
async fn retry_of_a_cs_only_message_goes_through_domain_selection() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "text", 1)).unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Cs);
    harness.settle().await;

    harness
        .cs_3gpp
        .take_held()
        .pop()
        .unwrap()
        .report(TransportOutcome::RetryRequested);
    harness.settle().await;

    assert_eq!(harness.resolver.get_connection_calls(), 2);
    assert_eq!(harness.normal().pending_requests().len(), 1);

    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;

    let ps = harness.ps.records();
    assert_eq!(ps.len(), 1);
    assert_eq!(ps[0].message_ref, Some(0));
    assert_eq!(harness.controller.sequence().peek(), 1);
}

#[tokio::test]
async fn malformed_retry_fails_without_dispatch() {
    let mut harness = Harness::new();

    let mut request = SendRequest::text("1111", "");
    let mut sent = request.on_sent();
    harness
        .controller
        .send_retry(MessageTracker::new(request, false));

    assert_eq!(
        sent.try_recv().expect("reported synchronously"),
        SendResult::Failed(ResultCode::SendRetryFailed)
    );
    harness.settle().await;
    assert_eq!(harness.resolver.get_connection_calls(), 0);
    assert_eq!(harness.ps.sent_count() + harness.cs_3gpp.sent_count(), 0);
}

#[tokio::test]
async fn termination_drains_to_default_without_finishing() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    harness.controller.send_text(text("1111", "r2", 2)).unwrap();

    let connection = harness.resolver.latest().unwrap();
    assert!(connection.terminate(7));
    harness.settle().await;

    assert_eq!(message_ids(&harness.ps), [1, 2]);
    assert_eq!(connection.finish_count(), 0);
    assert_eq!(harness.normal().state(), HolderState::Idle);
    assert!(harness.normal().pending_requests().is_empty());
}

#[tokio::test]
async fn termination_stops_waiting_on_an_unanswered_selection() {
    let mut harness = Harness::new();

    for message_id in 1..=3 {
        harness
            .controller
            .send_text(text("1111", "text", message_id))
            .unwrap();
        let connection = harness.resolver.latest().unwrap();
        assert!(connection.is_awaited());

        assert!(connection.terminate(1));
        harness.settle().await;

        assert!(!connection.is_awaited());
        assert_eq!(harness.normal().state(), HolderState::Idle);
    }

    assert_eq!(message_ids(&harness.ps), [1, 2, 3]);
}

#[tokio::test]
async fn termination_uses_cs_when_ps_is_unavailable() {
    let mut harness = Harness::new();
    harness.ps.set_available(false);

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    harness.resolver.latest().unwrap().terminate(1);
    harness.settle().await;

    assert_eq!(harness.ps.sent_count(), 0);
    assert_eq!(message_ids(&harness.cs_3gpp), [1]);
}

#[tokio::test]
async fn emergency_termination_only_uses_ps_with_emergency_support() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("911", "help", 1)).unwrap();
    harness.resolver.latest().unwrap().terminate(1);
    harness.settle().await;
    assert_eq!(message_ids(&harness.cs_3gpp), [1]);

    harness.ps.set_emergency_support(true);
    harness.controller.send_text(text("911", "help", 2)).unwrap();
    harness.resolver.latest().unwrap().terminate(1);
    harness.settle().await;
    assert_eq!(message_ids(&harness.ps), [2]);
}

#[tokio::test]
async fn stale_completion_is_ignored() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    let stale = harness.normal().connection_id().unwrap();
    harness.resolver.latest().unwrap().terminate(3);
    harness.settle().await;
    assert_eq!(harness.ps.sent_count(), 1);

    harness.controller.send_text(text("1111", "r2", 2)).unwrap();
    let current = harness.normal().connection_id().unwrap();
    assert_ne!(stale, current);

    harness
        .controller
        .on_domain_selected(TrafficClass::Normal, stale, Ok(Domain::Cs));
    harness
        .controller
        .on_selection_terminated(TrafficClass::Normal, ConnectionId::new(999), 1);

    assert_eq!(harness.cs_3gpp.sent_count(), 0);
    assert_eq!(harness.normal().pending_requests().len(), 1);
    assert!(harness.normal().is_current(current));
}

#[tokio::test]
async fn a_finished_connection_is_never_reused() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    let first = harness.resolver.latest().unwrap();
    first.complete(Domain::Ps);
    harness.settle().await;
    assert_eq!(first.finish_count(), 1);

    harness.controller.send_text(text("1111", "r2", 2)).unwrap();
    assert_eq!(harness.resolver.connections().len(), 2);
    let second = harness.resolver.latest().unwrap();
    assert_eq!(first.request_count(), 1);
    assert_eq!(second.request_count(), 1);
    assert_eq!(second.finish_count(), 0);
    assert!(!first.complete(Domain::Cs));
}

#[tokio::test]
async fn emergency_and_normal_traffic_select_independently() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "normal", 1)).unwrap();
    harness.controller.send_text(text("112", "emergency", 2)).unwrap();

    assert_eq!(harness.resolver.request_count(), 2);
    assert_eq!(harness.normal().pending_requests().len(), 1);
    assert_eq!(harness.emergency_holder().pending_requests().len(), 1);
    assert!(harness.emergency_holder().is_emergency());

    let emergency = harness.resolver.connection(1).unwrap();
    assert!(emergency.requests()[0].is_emergency);
    emergency.complete(Domain::Ps);
    harness.settle().await;

    assert_eq!(message_ids(&harness.ps), [2]);
    assert_eq!(harness.normal().pending_requests().len(), 1);
    assert_eq!(harness.emergency_holder().state(), HolderState::Idle);
}

#[tokio::test]
async fn disabled_domain_selection_dispatches_directly() {
    let mut harness = Harness::builder().without_domain_selection().build();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    assert_eq!(message_ids(&harness.ps), [1]);

    harness.ps.set_available(false);
    harness.controller.send_text(text("1111", "r2", 2)).unwrap();
    assert_eq!(message_ids(&harness.cs_3gpp), [2]);

    assert_eq!(harness.resolver.get_connection_calls(), 0);
    assert!(!harness.controller.snapshot().domain_selection_supported);
}

#[tokio::test]
async fn missing_resolver_dispatches_directly() {
    let mut harness = Harness::builder()
        .without_resolver()
        .with_voice_format(SmsFormat::ThreeGpp2)
        .build();
    harness.ps.set_available(false);

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    assert_eq!(message_ids(&harness.cs_3gpp2), [1]);
}

#[tokio::test]
async fn no_connection_falls_back_to_direct_dispatch() {
    let mut harness = Harness::new();
    harness.resolver.set_mode(ConnectionMode::NoConnection);

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();

    assert_eq!(harness.resolver.get_connection_calls(), 1);
    assert_eq!(message_ids(&harness.ps), [1]);
    assert_eq!(harness.normal().state(), HolderState::Idle);
}

#[tokio::test]
async fn connection_without_future_is_finished_and_bypassed() {
    let mut harness = Harness::new();
    harness.resolver.set_mode(ConnectionMode::NoFuture);

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();

    let connection = harness.resolver.latest().unwrap();
    assert_eq!(connection.request_count(), 1);
    assert_eq!(connection.finish_count(), 1);
    assert_eq!(message_ids(&harness.ps), [1]);
    assert_eq!(harness.normal().state(), HolderState::Idle);
}

#[tokio::test]
async fn failed_selection_uses_the_default_transport_and_finishes() {
    let mut harness = Harness::new();
    harness.ps.set_available(false);

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    let connection = harness.resolver.latest().unwrap();
    connection.fail(SelectionError::Failed("no coverage".to_string()));
    harness.settle().await;

    assert_eq!(message_ids(&harness.cs_3gpp), [1]);
    assert_eq!(connection.finish_count(), 1);
}

#[tokio::test]
async fn rejected_requests_never_enter_the_state_machine() {
    let mut harness = Harness::new();

    let error = harness
        .controller
        .send_text(SendRequest::text(" ", "text"))
        .unwrap_err();
    assert!(matches!(
        error,
        DispatchError::Rejected(RejectReason::EmptyDestination)
    ));

    let error = harness
        .controller
        .send_data(SendRequest::text("1111", "text"))
        .unwrap_err();
    assert!(error.is_rejected());

    harness.storage.set_available(false);
    let error = harness
        .controller
        .send_text(text("1111", "text", 1))
        .unwrap_err();
    assert!(matches!(
        error,
        DispatchError::Rejected(RejectReason::StorageUnavailable)
    ));

    assert_eq!(harness.resolver.get_connection_calls(), 0);
    assert_eq!(harness.controller.sequence().peek(), 0);
}

#[tokio::test]
async fn multipart_and_data_use_one_reference_each() {
    let mut harness = Harness::builder().without_domain_selection().build();

    harness
        .controller
        .send_multipart_text(SendRequest::multipart(
            "1111",
            vec!["part one".to_string(), "part two".to_string()],
        ))
        .unwrap();
    harness
        .controller
        .send_data(SendRequest::data("1111", 9200, vec![0xde, 0xad]))
        .unwrap();

    let refs: Vec<_> = harness
        .ps
        .records()
        .iter()
        .map(|record| record.message_ref)
        .collect();
    assert_eq!(refs, [Some(0), Some(1)]);
}

#[tokio::test]
async fn message_refs_wrap_at_the_modulus() {
    let mut harness = Harness::builder().without_domain_selection().build();
    harness.controller = harness
        .controller
        .with_sequence(SequenceCounter::starting_at(255, 256));

    harness.controller.send_text(text("1111", "a", 1)).unwrap();
    harness.controller.send_text(text("1111", "b", 2)).unwrap();

    let refs: Vec<_> = harness
        .ps
        .records()
        .iter()
        .map(|record| record.message_ref)
        .collect();
    assert_eq!(refs, [Some(255), Some(0)]);
}

#[tokio::test]
async fn transport_owned_refs_leave_the_counter_alone() {
    let mut harness = Harness::builder()
        .without_domain_selection()
        .with_ps(RecordingDispatcher::ps().with_own_message_refs())
        .build();

    harness.controller.send_text(text("1111", "a", 1)).unwrap();

    assert_eq!(harness.ps.records()[0].message_ref, Some(100));
    assert_eq!(harness.controller.sequence().peek(), 0);
}

#[tokio::test]
async fn emergency_lifecycle_is_opened_and_closed() {
    let mut harness = Harness::builder().without_domain_selection().build();

    let mut request = text("911", "help", 42);
    let sent = request.on_sent();
    harness.controller.send_text(request).unwrap();
    harness.settle().await;
    assert_eq!(harness.emergency.started(), [("911".to_string(), true)]);

    harness
        .ps
        .take_held()
        .pop()
        .unwrap()
        .report(TransportOutcome::Failed(ResultCode::NetworkError));
    harness.settle().await;

    assert_eq!(
        harness.emergency.ended(),
        [EndedSms {
            message_id: 42,
            success: false,
            domain: Domain::Ps,
            is_last_part: true,
        }]
    );
    assert_eq!(
        sent.await.unwrap(),
        SendResult::Failed(ResultCode::NetworkError)
    );

    // Normal traffic never touches the emergency tracker.
    harness.controller.send_text(text("1111", "hi", 43)).unwrap();
    harness.ps.take_held().pop().unwrap().report(TransportOutcome::Sent);
    harness.settle().await;
    assert_eq!(harness.emergency.started().len(), 1);
    assert_eq!(harness.emergency.ended().len(), 1);
}

#[tokio::test]
async fn emergency_start_is_only_issued_on_first_dispatch() {
    let mut harness = Harness::builder().without_domain_selection().build();
    harness.emergency.reject_start_with(3);

    harness.controller.send_text(text("112", "help", 1)).unwrap();
    harness.ps.take_held().pop().unwrap().report(TransportOutcome::Fallback);
    harness.settle().await;

    assert_eq!(harness.cs_3gpp.sent_count(), 1);
    assert_eq!(harness.emergency.started(), [("112".to_string(), true)]);
}

#[tokio::test]
async fn inbound_emergency_sms_is_reported() {
    let mut harness = Harness::new();

    harness.controller.on_inbound_sms("1111");
    assert_eq!(harness.emergency.received(), 0);
    harness.controller.on_inbound_sms("911");
    assert_eq!(harness.emergency.received(), 1);
}

#[tokio::test]
async fn installed_resolver_applies_to_new_connections_only() {
    let mut harness = Harness::new();

    harness.controller.send_text(text("1111", "r1", 1)).unwrap();
    let original = harness.resolver.latest().unwrap();

    let replacement = Arc::new(MockResolver::new());
    harness
        .controller
        .install_resolver(Some(Arc::clone(&replacement) as Arc<dyn DomainSelectionResolver>));

    harness.controller.send_text(text("1111", "r2", 2)).unwrap();
    assert_eq!(replacement.get_connection_calls(), 0);
    assert_eq!(harness.normal().pending_requests().len(), 2);

    original.complete(Domain::Ps);
    harness.settle().await;
    assert_eq!(message_ids(&harness.ps), [1, 2]);

    harness.controller.send_text(text("1111", "r3", 3)).unwrap();
    assert_eq!(replacement.get_connection_calls(), 1);
    assert_eq!(harness.resolver.get_connection_calls(), 1);

    harness.controller.install_resolver(None);
    assert!(!harness.controller.is_domain_selection_supported());
}

#[tokio::test]
async fn subscribers_see_the_selection_and_dispatch_events() {
    let mut harness = Harness::new();
    let mut events = harness.controller.subscribe();

    harness
        .controller
        .send_text(SendRequest::text("1111", "text").options(SendOptions {
            message_id: 5,
            ..SendOptions::default()
        }))
        .unwrap();
    let connection = harness.normal().connection_id().unwrap();
    harness.resolver.latest().unwrap().complete(Domain::Ps);
    harness.settle().await;

    let mut seen = Vec::new();
    while let Ok(event) = events.receiver.try_recv() {
        seen.push(event);
    }

    assert_eq!(
        seen,
        [
            DispatchEvent::SelectionRequested {
                class: TrafficClass::Normal,
                connection,
            },
            DispatchEvent::SelectionCompleted {
                class: TrafficClass::Normal,
                connection,
                domain: Some(Domain::Ps),
            },
            DispatchEvent::Dispatched {
                message_id: 5,
                message_ref: Some(0),
                domain: Domain::Ps,
            },
        ]
    );

    assert!(harness.controller.unsubscribe(events.id));
    let late = harness.controller.subscribe();
    drop(late);
}

#[tokio::test]
async fn snapshot_for_a_departed_requester_is_dropped() {
    let mut harness = Harness::new();

    let (reply, receiver) = oneshot::channel();
    drop(receiver);
    harness.controller.handle(Command::Snapshot(reply));

    let (reply, receiver) = oneshot::channel();
    harness.controller.handle(Command::Snapshot(reply));
    let snapshot = receiver.await.unwrap();
    assert_eq!(snapshot.next_message_ref, 0);
    assert!(snapshot.domain_selection_supported);
}
