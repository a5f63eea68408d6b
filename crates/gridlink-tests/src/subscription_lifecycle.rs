//! Subscription lifecycle scenarios: poll delivery, cancellation, failure
//! propagation, all driven through the typed bindings and the fake hub.
