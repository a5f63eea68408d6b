//! Property-based tests for the core laws: FIFO dispatch and response
//! shaping.

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::task::{Context, RawWaker, RawWakerVTable, Waker};

    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crate::harness::{hub_client, FakeHub};
    use gridlink_client::{shape, CallDescriptor, ResponseStyle, Shaped};

    /// A waker that drops wakeups; used to drive a future exactly one step.
    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        // Safety: the vtable ignores its data pointer entirely.
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    /// A single-threaded runtime for property bodies, which cannot be async.
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime must build")
    }

    proptest! {
        /// For any sequence of calls enqueued without awaiting completion, the
        /// transport observes them in enqueue order, and a failing call never
        /// blocks the ones behind it.
        #[test]
        fn prop_dispatch_order_equals_enqueue_order(
            names in proptest::collection::vec("[a-z]{1,8}", 0..12),
            failures in proptest::collection::vec(any::<bool>(), 0..12),
        ) {
            runtime().block_on(async move {
                let hub = FakeHub::new();
                let client = hub_client(hub.clone());

                let calls: Vec<CallDescriptor> = names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        CallDescriptor::new(format!("{}{}", name, i), ResponseStyle::Multi)
                    })
                    .collect();
                let failing: Vec<bool> = calls
                    .iter()
                    .enumerate()
                    .map(|(i, call)| {
                        let fail = failures.get(i).copied().unwrap_or(false);
                        if fail {
                            hub.fail_request(&call.request);
                        }
                        fail
                    })
                    .collect();

                // Enqueue everything before awaiting anything: one manual poll
                // is enough to run each submission up to its reply await.
                let mut pending: Vec<_> = calls
                    .iter()
                    .map(|call| Box::pin(client.api_request(call)))
                    .collect();
                let waker = noop_waker();
                let mut cx = Context::from_waker(&waker);
                for future in &mut pending {
                    let _ = future.as_mut().poll(&mut cx);
                }

                for (future, fail) in pending.into_iter().zip(&failing) {
                    let outcome = future.await;
                    assert_eq!(outcome.is_err(), *fail);
                }

                let expected: Vec<String> = calls
                    .iter()
                    .map(|call| format!("POST http://hub/api/{}", call.request))
                    .collect();
                assert_eq!(hub.request_lines(), expected);
                assert_eq!(client.pending_requests(), 0);
            });
        }

        /// MULTI returns `results` unchanged and in order, for any sequence.
        #[test]
        fn prop_multi_preserves_results_order(values in proptest::collection::vec(any::<i64>(), 0..20)) {
            let results: Vec<Value> = values.iter().map(|v| json!({"v": v})).collect();
            let shaped = shape(ResponseStyle::Multi, json!({"results": results.clone()})).unwrap();
            assert_eq!(shaped, Shaped::Multi(results));
        }

        /// OPTIONAL is none exactly when `results` is empty, otherwise the first
        /// element with the rest discarded.
        #[test]
        fn prop_optional_takes_at_most_first(values in proptest::collection::vec(any::<i64>(), 0..20)) {
            let results: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            let shaped = shape(ResponseStyle::Optional, json!({"results": results.clone()})).unwrap();
            match shaped {
                Shaped::Optional(None) => assert!(values.is_empty()),
                Shaped::Optional(Some(first)) => assert_eq!(first, results[0]),
                other => panic!("OPTIONAL shaped to {:?}", other),
            }
        }

        /// SINGLE passes any non-null body through unchanged.
        #[test]
        fn prop_single_is_identity_on_non_null(text in "[a-zA-Z0-9 ]{0,32}", number in any::<i64>()) {
            let body = json!({"text": text, "number": number});
            let shaped = shape(ResponseStyle::Single, body.clone()).unwrap();
            assert_eq!(shaped, Shaped::Single(body));
        }
    }
}
