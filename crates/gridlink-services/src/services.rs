//! The `core` service list: typed calls over the facade.
//!
//! Every method is a thin descriptor builder; ordering, token attachment and
//! shaping all happen in the client core. Result bodies are deserialized
//! into the wire models in [`crate::model`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use gridlink_client::{
    CallDescriptor, Client, ClientError, ResponseStyle, Result, Shaped, Subscription,
};

use crate::model::{Agent, Command, Entity, Measurement, Point};

/// Static registration entry for this binding group.
pub const CORE_SERVICE_LIST: gridlink_client::ServiceList = gridlink_client::ServiceList {
    name: "core",
    calls: &[
        "getPoints",
        "findPointByName",
        "getCommands",
        "getEntityByUuid",
        "getAgentByName",
        "getMeasurementsByNames",
        "subscribeToMeasurementsByNames",
    ],
};

/// Initial snapshot plus the change feed from a subscribe-style call.
pub struct MeasurementFeed {
    /// Most recent measurement per requested point, at subscribe time.
    pub measurements: Vec<Measurement>,
    /// Handle delivering later changes; polling begins on `start`.
    pub subscription: Subscription,
}

/// The core service calls, as an extension of the client facade.
#[async_trait]
pub trait CoreServices {
    /// All points in the system.
    async fn get_points(&self) -> Result<Vec<Point>>;

    /// The point with `name`, or `None` when no such point exists.
    async fn find_point_by_name(&self, name: &str) -> Result<Option<Point>>;

    /// All commands in the system.
    async fn get_commands(&self) -> Result<Vec<Command>>;

    /// The entity with the given uuid.
    async fn get_entity_by_uuid(&self, uuid: &str) -> Result<Entity>;

    /// The agent with the given login name.
    async fn get_agent_by_name(&self, name: &str) -> Result<Agent>;

    /// Most recent measurement for each named point.
    async fn get_measurements_by_names(&self, point_names: &[&str]) -> Result<Vec<Measurement>>;

    /// Most recent measurements for the named points, plus a feed of later
    /// changes.
    async fn subscribe_to_measurements_by_names(
        &self,
        point_names: &[&str],
    ) -> Result<MeasurementFeed>;
}

#[async_trait]
impl CoreServices for Client {
    async fn get_points(&self) -> Result<Vec<Point>> {
        let call = CallDescriptor::new("getPoints", ResponseStyle::Multi).with_result_type("point");
        decode_multi(self.api_request(&call).await?)
    }

    async fn find_point_by_name(&self, name: &str) -> Result<Option<Point>> {
        let call = CallDescriptor::new("findPointByName", ResponseStyle::Optional)
            .with_payload(json!({ "name": name }))
            .with_result_type("point");
        decode_optional(self.api_request(&call).await?)
    }

    async fn get_commands(&self) -> Result<Vec<Command>> {
        let call =
            CallDescriptor::new("getCommands", ResponseStyle::Multi).with_result_type("command");
        decode_multi(self.api_request(&call).await?)
    }

    async fn get_entity_by_uuid(&self, uuid: &str) -> Result<Entity> {
        let call = CallDescriptor::new("getEntityByUuid", ResponseStyle::Single)
            .with_payload(json!({ "uuid": uuid }))
            .with_result_type("entity");
        decode_single(self.api_request(&call).await?)
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Agent> {
        let call = CallDescriptor::new("getAgentByName", ResponseStyle::Single)
            .with_payload(json!({ "name": name }))
            .with_result_type("agent");
        decode_single(self.api_request(&call).await?)
    }

    async fn get_measurements_by_names(&self, point_names: &[&str]) -> Result<Vec<Measurement>> {
        let call = CallDescriptor::new("getMeasurementsByNames", ResponseStyle::Multi)
            .with_payload(json!({ "pointNames": point_names }))
            .with_result_type("measurement");
        decode_multi(self.api_request(&call).await?)
    }

    async fn subscribe_to_measurements_by_names(
        &self,
        point_names: &[&str],
    ) -> Result<MeasurementFeed> {
        let call = CallDescriptor::new("subscribeToMeasurementsByNames", ResponseStyle::Multi)
            .with_payload(json!({ "pointNames": point_names }))
            .with_result_type("measurement");
        let answer = self.subscribe_api_request(&call).await?;
        Ok(MeasurementFeed {
            measurements: decode_multi(answer.result)?,
            subscription: answer.subscription,
        })
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Protocol {
            reason: format!("result did not match its wire model: {}", e),
        })
}

fn decode_single<T: DeserializeOwned>(shaped: Shaped) -> Result<T> {
    decode(shaped.into_single()?)
}

fn decode_multi<T: DeserializeOwned>(shaped: Shaped) -> Result<Vec<T>> {
    shaped.into_multi()?.into_iter().map(decode).collect()
}

fn decode_optional<T: DeserializeOwned>(shaped: Shaped) -> Result<Option<T>> {
    shaped.into_optional()?.map(decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridlink_client::{
        ClientConfig, RawResponse, Transport, TransportRequest, Verb, SUBSCRIPTION_TOKEN_HEADER,
    };
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    struct ScriptedTransport {
        responses: Mutex<VecDeque<RawResponse>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(bodies: Vec<&str>) -> Arc<Self> {
            let responses = bodies
                .into_iter()
                .map(|body| RawResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: body.to_string(),
                })
                .collect();
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<RawResponse> {
            self.seen.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClientError::Protocol {
                    reason: "script exhausted".to_string(),
                })
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> Client {
        let config = ClientConfig {
            base_url: "http://hub".to_string(),
            service_lists: vec!["core".to_string()],
            ..ClientConfig::default()
        };
        Client::builder(config)
            .transport(transport)
            .services(&[CORE_SERVICE_LIST])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_points_decodes_models() {
        let transport = ScriptedTransport::new(vec![
            r#"{"results":[{"uuid":{"value":"p-1"},"name":"line.volts","type":"ANALOG","unit":"kV"}]}"#,
        ]);
        let client = client(transport.clone());

        let points = client.get_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "line.volts");

        let seen = transport.seen();
        assert_eq!(seen[0].verb, Verb::Post);
        assert_eq!(seen[0].url, "http://hub/api/getPoints");
    }

    #[tokio::test]
    async fn test_find_point_by_name_absent_is_none() {
        let transport = ScriptedTransport::new(vec![r#"{"results":[]}"#]);
        let client = client(transport.clone());

        let found = client.find_point_by_name("no.such.point").await.unwrap();
        assert!(found.is_none());
        assert_eq!(
            transport.seen()[0].body.as_ref().unwrap()["name"],
            "no.such.point"
        );
    }

    #[tokio::test]
    async fn test_find_point_by_name_takes_first() {
        let transport = ScriptedTransport::new(vec![
            r#"{"results":[{"name":"a","uuid":null,"type":null,"unit":null},{"name":"b","uuid":null,"type":null,"unit":null}]}"#,
        ]);
        let client = client(transport);

        let found = client.find_point_by_name("a").await.unwrap().unwrap();
        assert_eq!(found.name, "a");
    }

    #[tokio::test]
    async fn test_get_entity_by_uuid_sends_uuid_payload() {
        let transport = ScriptedTransport::new(vec![
            r#"{"uuid":{"value":"e-7"},"name":"sub1","types":["Substation"]}"#,
        ]);
        let client = client(transport.clone());

        let entity = client.get_entity_by_uuid("e-7").await.unwrap();
        assert_eq!(entity.types, vec!["Substation".to_string()]);
        assert_eq!(transport.seen()[0].body.as_ref().unwrap()["uuid"], "e-7");
    }

    #[tokio::test]
    async fn test_get_measurements_by_names_sends_point_names() {
        let transport = ScriptedTransport::new(vec![
            r#"{"results":[{"name":"line.volts","type":"DOUBLE","double_val":118.2,"int_val":null,"bool_val":null,"string_val":null,"quality":null,"unit":"kV","time":1316647419000}]}"#,
        ]);
        let client = client(transport.clone());

        let measurements = client
            .get_measurements_by_names(&["line.volts"])
            .await
            .unwrap();
        assert_eq!(measurements.len(), 1);
        assert_eq!(
            measurements[0].value(),
            crate::model::MeasurementValue::Double(118.2)
        );
        assert_eq!(
            transport.seen()[0].body.as_ref().unwrap()["pointNames"][0],
            "line.volts"
        );
    }

    #[tokio::test]
    async fn test_model_mismatch_is_protocol_error() {
        // getPoints answering with a number where an object belongs.
        let transport = ScriptedTransport::new(vec![r#"{"results":[42]}"#]);
        let client = client(transport);

        let err = client.get_points().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_returns_snapshot_and_feed() {
        let transport = Arc::new(ScriptedTransport {
            responses: Mutex::new(VecDeque::from([RawResponse {
                status: 200,
                headers: HashMap::from([(
                    SUBSCRIPTION_TOKEN_HEADER.to_ascii_lowercase(),
                    "feed-3".to_string(),
                )]),
                body: r#"{"results":[{"name":"line.volts","type":"INT","int_val":7,"double_val":null,"bool_val":null,"string_val":null,"quality":null,"unit":null,"time":null}]}"#
                    .to_string(),
            }])),
            seen: Mutex::new(Vec::new()),
        });
        let client = client(transport.clone());

        let feed = client
            .subscribe_to_measurements_by_names(&["line.volts"])
            .await
            .unwrap();
        assert_eq!(feed.measurements.len(), 1);
        assert_eq!(feed.subscription.token().as_str(), "feed-3");
        assert_eq!(
            transport.seen()[0].url,
            "http://hub/api/subscribeToMeasurementsByNames"
        );
    }

    #[test]
    fn test_core_list_registers_its_calls() {
        assert_eq!(CORE_SERVICE_LIST.name, "core");
        assert!(CORE_SERVICE_LIST.calls.contains(&"getPoints"));
        assert!(CORE_SERVICE_LIST
            .calls
            .contains(&"subscribeToMeasurementsByNames"));
    }
}
