//! Engine client tests against a mock engine served over TCP.

use std::time::Duration;

use serde_json::json;
use swarmkick_engine::{ClientOptions, EngineClient, EngineError, Endpoint};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> EngineClient {
    let endpoint = Endpoint::parse(&server.uri()).unwrap();
    EngineClient::new(endpoint, &ClientOptions::default()).unwrap()
}

fn service_json(replicas: u64, version: u64) -> serde_json::Value {
    json!({
        "ID": "svc1",
        "Version": { "Index": version },
        "Spec": {
            "Name": "web",
            "Labels": { "tier": "frontend" },
            "TaskTemplate": { "ContainerSpec": { "Image": "nginx:1.25" } },
            "Mode": { "Replicated": { "Replicas": replicas } }
        }
    })
}

#[tokio::test]
async fn test_list_services() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([service_json(3, 10)])))
        .expect(1)
        .mount(&server)
        .await;

    let services = client_for(&server).list_services().await.unwrap();

    assert_eq!(services.len(), 1);
    assert_eq!(services[0].spec.name, "web");
    assert_eq!(services[0].spec.replicas(), Some(3));
}

#[tokio::test]
async fn test_update_service_sends_version_and_full_spec() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/svc1/update"))
        .and(query_param("version", "10"))
        .and(body_partial_json(json!({
            "Name": "web",
            "Labels": { "tier": "frontend" },
            "Mode": { "Replicated": { "Replicas": 4 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Warnings": null })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let service: swarmkick_engine::Service = serde_json::from_value(service_json(3, 10)).unwrap();
    let mut spec = service.spec.clone();
    assert!(spec.set_replicas(4));

    client.update_service("svc1", 10, &spec).await.unwrap();
}

#[tokio::test]
async fn test_update_out_of_sequence_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/svc1/update"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "rpc error: code = Unknown desc = update out of sequence"
        })))
        .mount(&server)
        .await;

    let service: swarmkick_engine::Service = serde_json::from_value(service_json(3, 9)).unwrap();
    let err = client_for(&server)
        .update_service("svc1", 9, &service.spec)
        .await
        .unwrap_err();

    assert!(err.is_conflict(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_list_containers_requests_all_states() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/containers/json"))
        .and(query_param("all", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Id": "c1", "Names": ["/web.1.x"], "Image": "nginx:1.25", "State": "running", "Status": "Up 2 hours", "Created": 1700000000 },
            { "Id": "c0", "Names": ["/web.1.w"], "Image": "nginx:1.25", "State": "exited", "Status": "Exited (137)", "Created": 1690000000 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let containers = client_for(&server).list_containers(true).await.unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].id, "c1");
    assert_eq!(containers[1].state, "exited");
    assert_eq!(containers[1].created, 1690000000);
}

#[tokio::test]
async fn test_kill_missing_container_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/containers/c9/kill"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "No such container: c9" })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).kill_container("c9").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("No such container"));
}

#[tokio::test]
async fn test_kill_container() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/containers/c1/kill"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).kill_container("c1").await.unwrap();
}

#[tokio::test]
async fn test_slow_engine_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let options = ClientOptions {
        timeout: Duration::from_millis(100),
        api_version: None,
    };
    let client = EngineClient::new(Endpoint::parse(&server.uri()).unwrap(), &options).unwrap();
    let err = client.list_nodes().await.unwrap_err();

    assert!(err.is_unreachable(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let endpoint = Endpoint::node("127.0.0.1", 1);
    let client = EngineClient::new(endpoint, &ClientOptions::default()).unwrap();

    let err = client.list_containers(true).await.unwrap_err();

    assert!(matches!(err, EngineError::Transport { .. }));
}
