//! Property tests for request manager invariants.

use proptest::prelude::*;
use syncline_client::{RequestManager, ResponseDisposition, CONNECTION_LOST_MESSAGE};
use syncline_protocol::{
    FunctionOutcome, RequestId, RequestMessage, ResponseMessage, Timestamp, Value,
};

fn mutation(id: u32) -> RequestMessage {
    RequestMessage::mutation(RequestId::new(id), "m", vec![])
}

fn action(id: u32) -> RequestMessage {
    RequestMessage::action(RequestId::new(id), "a", vec![])
}

fn mutation_response(id: u32, ts: u64) -> ResponseMessage {
    ResponseMessage::mutation(
        RequestId::new(id),
        FunctionOutcome::Success(Value::from(id)),
        Timestamp::new(ts),
        vec![],
    )
}

proptest! {
    #[test]
    fn incomplete_iff_some_request_unanswered(answered in proptest::collection::vec(any::<bool>(), 0..16)) {
        let mut manager = RequestManager::new();
        let _handles: Vec<_> = (0..answered.len() as u32)
            .map(|id| manager.request(mutation(id), true))
            .collect();

        for (id, answer) in answered.iter().enumerate() {
            if *answer {
                manager.on_response(mutation_response(id as u32, 0));
            }
        }

        prop_assert_eq!(
            manager.has_incomplete_requests(),
            answered.iter().any(|answer| !answer)
        );
    }

    #[test]
    fn mutations_resolve_only_once_observed(
        response_ts in proptest::collection::vec(proptest::option::of(0u64..20), 1..12),
        observed in 0u64..20,
    ) {
        let mut manager = RequestManager::new();
        let mut handles: Vec<_> = (0..response_ts.len() as u32)
            .map(|id| manager.request(mutation(id), true))
            .collect();

        for (id, ts) in response_ts.iter().enumerate() {
            if let Some(ts) = ts {
                manager.on_response(mutation_response(id as u32, *ts));
            }
        }
        for handle in handles.iter_mut() {
            prop_assert!(handle.try_result().is_none());
        }

        manager.remove_completed(Timestamp::new(observed));

        let mut expected_replay = Vec::new();
        for (id, (handle, ts)) in handles.iter_mut().zip(&response_ts).enumerate() {
            let should_resolve = matches!(ts, Some(ts) if *ts <= observed);
            let result = handle.try_result();
            prop_assert_eq!(result.is_some(), should_resolve);
            if let Some(result) = result {
                prop_assert_eq!(result.value(), Some(&Value::from(id as u32)));
            } else {
                expected_replay.push(mutation(id as u32));
            }
        }

        // Every unresolved mutation is replayed, answered or not.
        prop_assert_eq!(manager.restart(), expected_replay);
    }

    #[test]
    fn restart_resends_unsent_actions_and_fails_sent_ones(
        sent_flags in proptest::collection::vec(any::<bool>(), 0..12),
    ) {
        let mut manager = RequestManager::new();
        let mut handles: Vec<_> = sent_flags
            .iter()
            .enumerate()
            .map(|(id, sent)| manager.request(action(id as u32), *sent))
            .collect();

        let expected: Vec<_> = sent_flags
            .iter()
            .enumerate()
            .filter(|(_, sent)| !**sent)
            .map(|(id, _)| action(id as u32))
            .collect();
        prop_assert_eq!(manager.restart(), expected);

        for (handle, sent) in handles.iter_mut().zip(&sent_flags) {
            let result = handle.try_result();
            if *sent {
                let result = result.expect("sent action must be resolved");
                prop_assert_eq!(result.error_message(), Some(CONNECTION_LOST_MESSAGE));
            } else {
                prop_assert!(result.is_none());
            }
        }

        // Replayed actions now count as sent.
        prop_assert!(manager.restart().is_empty());
        prop_assert_eq!(manager.outstanding_count(), 0);
    }

    #[test]
    fn unknown_responses_change_nothing(
        registered in 0u32..8,
        stray_id in 8u32..64,
        ts in any::<u64>(),
    ) {
        let mut manager = RequestManager::new();
        let _handles: Vec<_> = (0..registered)
            .map(|id| manager.request(mutation(id), true))
            .collect();
        let incomplete = manager.has_incomplete_requests();

        prop_assert_eq!(
            manager.on_response(mutation_response(stray_id, ts)),
            ResponseDisposition::Ignored
        );
        prop_assert_eq!(manager.outstanding_count(), registered as usize);
        prop_assert_eq!(manager.has_incomplete_requests(), incomplete);
    }
}
