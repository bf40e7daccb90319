//! # RPC Flows
//!
//! Request/reply correlation, reference translation and the connection
//! lifecycle over a real socket:
//!
//! 1. Replies resolve their own callers regardless of arrival order
//! 2. References travel as `{"$id"}` and come back as the same proxy
//! 3. At most one live connection per connector; closing frees the slot
//! 4. A close rejects every outstanding call

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use ebeast_jsonipc::domain::error::codes;
    use ebeast_jsonipc::{
        ClientError, Connection, Connector, ProxyRegistry, RemoteObject, RemoteRef, Resolved,
        RpcError, Server,
    };

    use crate::{init_logging, Answer, StubEngine};

    const WAIT: Duration = Duration::from_secs(5);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn connector() -> Connector {
        let proxies = Arc::new(ProxyRegistry::new());
        proxies.register::<Server>().unwrap();
        Connector::new(proxies)
    }

    async fn open(engine: &StubEngine, connector: &Connector) -> (Connection, Server) {
        let connection = timeout(WAIT, connector.open(&engine.config().connection))
            .await
            .expect("open timed out")
            .expect("open failed");
        let server = connection
            .ready()
            .into_object::<Server>()
            .expect("handshake returns the server");
        (connection, server)
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_callers() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("slow", |params| Answer::Defer(params[1].clone()));
        let connector = connector();
        let (_connection, server) = open(&engine, &connector).await;

        let calls: Vec<_> = (1..=3)
            .map(|n| {
                let server = server.clone();
                tokio::spawn(async move { server.call_value("slow", vec![json!(n)]).await })
            })
            .collect();

        timeout(WAIT, engine.wait_for("slow", 3)).await.unwrap();
        assert_eq!(engine.deferred_count(), 3);
        // newest first
        assert_eq!(engine.release_deferred(), 3);

        let mut ids: Vec<u64> = engine.requests_for("slow").iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3, "request ids must be distinct");

        for (n, call) in (1..=3).zip(calls) {
            let value = timeout(WAIT, call).await.unwrap().unwrap().unwrap();
            assert_eq!(value, json!(n));
        }
    }

    #[tokio::test]
    async fn test_error_reply_surfaces_as_rpc_error() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        let err = connection
            .send_value("no_such_method", vec![])
            .await
            .unwrap_err();
        match err {
            ClientError::Rpc(e) => {
                assert_eq!(e.code, codes::METHOD_NOT_FOUND);
                assert!(e.message.contains("no_such_method"));
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
        // the connection stays usable
        assert!(!connection.is_closed());
        let echoed = connection.send_value("echo", vec![json!("x")]).await.unwrap();
        assert_eq!(echoed, json!(["x"]));
    }

    #[tokio::test]
    async fn test_wrong_arity_is_invalid_params() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        let err = connection
            .send_value("Bse/EventHub/connect", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rpc(ref e) if e.code == codes::INVALID_PARAMS));
        assert_eq!(err.to_string(), "remote error: [-32602] Invalid params: wrong number of arguments");
    }

    #[tokio::test]
    async fn test_null_result_is_a_success() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("nothing", |_| Answer::Result(Value::Null));
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        let value = connection.send_value("nothing", vec![]).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    // =============================================================================
    // REFERENCES
    // =============================================================================

    #[tokio::test]
    async fn test_method_calls_send_this_as_id_only() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let (_connection, server) = open(&engine, &connector).await;

        server.call_value("echo", vec![json!(7)]).await.unwrap();

        let sent = engine.requests_for("echo");
        assert_eq!(sent[0].params, vec![json!({"$id": 1}), json!(7)]);
    }

    #[tokio::test]
    async fn test_reference_round_trip_yields_equal_proxy() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("self_ref", |params| {
            let id = params[1]["$id"].clone();
            Answer::Result(json!({"$id": id, "$class": "Bse::ServerImpl"}))
        });
        let connector = connector();
        let (_connection, server) = open(&engine, &connector).await;

        // the full reference is reduced to {"$id"} on the way out
        let outgoing = Value::from(server.proxy());
        let returned = server
            .call("self_ref", vec![outgoing])
            .await
            .unwrap()
            .into_object::<Server>()
            .expect("registered class comes back typed");

        assert_eq!(returned, server);
        assert_eq!(engine.requests_for("self_ref")[0].params[1], json!({"$id": 1}));
    }

    #[tokio::test]
    async fn test_unregistered_class_stays_plain_data() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("track", |_| {
            Answer::Result(json!([{"$id": 40, "$class": "Bse::TrackImpl"}, 3]))
        });
        let connector = connector();
        let (_connection, server) = open(&engine, &connector).await;

        match server.call("track", vec![]).await.unwrap() {
            Resolved::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(items[0].as_proxy().is_none());
                assert_eq!(items[0].as_data(), Some(&json!({"$id": 40, "$class": "Bse::TrackImpl"})));
                assert_eq!(items[1].as_data(), Some(&json!(3)));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_opaque_unknown_classes_become_proxies() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("track", |_| Answer::Result(json!({"$id": 40, "$class": "Bse::TrackImpl"})));
        let proxies = Arc::new(ProxyRegistry::with_opaque_unknown(true));
        proxies.register::<Server>().unwrap();
        let connector = Connector::new(proxies);
        let (_connection, server) = open(&engine, &connector).await;

        let track = server.call("track", vec![]).await.unwrap().into_proxy().unwrap();
        assert_eq!(track.reference(), &RemoteRef::new(40, "Bse::TrackImpl"));
        assert_eq!(track.class(), "Bse::TrackImpl");
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_second_open_is_rejected_until_close() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        let err = connector.open(&engine.config().connection).await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyOpen));
        assert_eq!(connector.current(), Some(connection.clone()));

        connection.close().await;
        timeout(WAIT, connection.closed()).await.unwrap();
        assert!(connector.current().is_none());

        let (reopened, _server) = open(&engine, &connector).await;
        assert_ne!(reopened, connection);
        assert_eq!(engine.connections(), 2);
    }

    #[tokio::test]
    async fn test_engine_close_rejects_outstanding_requests() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("hang", |_| Answer::Ignore);
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.send_value("hang", vec![]).await })
            })
            .collect();
        timeout(WAIT, engine.wait_for("hang", 2)).await.unwrap();
        assert_eq!(connection.pending_count(), 2);

        engine.close();
        for call in calls {
            let result = timeout(WAIT, call).await.unwrap().unwrap();
            assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        }
        assert!(connection.is_closed());
        assert_eq!(connection.pending_count(), 0);

        let late = connection.send_value("echo", vec![]).await;
        assert!(matches!(late, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_request_statistics_follow_outcomes() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("hang", |_| Answer::Ignore);
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        connection.send_value("echo", vec![]).await.unwrap();
        connection.send_value("no_such_method", vec![]).await.unwrap_err();
        engine.send_text(r#"{"id": 999999, "result": 1}"#);

        let hang = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.send_value("hang", vec![]).await })
        };
        timeout(WAIT, engine.wait_for("hang", 1)).await.unwrap();
        assert!(connection.oldest_pending_age().is_some());

        engine.close();
        let result = timeout(WAIT, hang).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));

        // handshake, echo, the error reply, then the rejected call
        let stats = connection.pending_stats();
        assert_eq!(stats.total_registered.load(Ordering::Relaxed), 4);
        assert_eq!(stats.total_completed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.total_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(stats.total_unknown.load(Ordering::Relaxed), 1);
        assert!(connection.oldest_pending_age().is_none());
    }

    #[tokio::test]
    async fn test_handshake_rejection() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("$jsonipc.initialize", |_| {
            Answer::Error(RpcError::new(codes::APPLICATION_ERROR, "Application error: unauthorized"))
        });
        let connector = connector();

        let err = timeout(WAIT, connector.open(&engine.config().connection))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::Handshake(ref e) if e.code == -32500));
        assert!(connector.current().is_none());

        // the slot is free for another attempt
        engine.on("$jsonipc.initialize", |_| {
            Answer::Result(json!({"$id": 1, "$class": "Bse::ServerImpl"}))
        });
        let (_connection, server) = open(&engine, &connector).await;
        assert_eq!(server.proxy().id(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_a_connect_error() {
        init_logging();
        let connector = connector();
        let mut config = ebeast_jsonipc::ClientConfig::default();
        config.connection.url = "ws://127.0.0.1:1/".into();

        let err = timeout(WAIT, connector.open(&config.connection))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
        assert!(connector.current().is_none());
    }

    #[tokio::test]
    async fn test_subprotocol_is_offered() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let mut config = engine.config();
        config.connection.protocol = Some("auth-0123abcd".into());

        timeout(WAIT, connector.open(&config.connection))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.protocols(), vec![Some("auth-0123abcd".to_string())]);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_ignored() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = connector();
        let (connection, _server) = open(&engine, &connector).await;

        engine.send_text("this is not json");
        engine.send_text(r#"{"unexpected": true}"#);
        engine.send_text(r#"{"id": 999999, "result": 1}"#);

        let value = timeout(WAIT, connection.send_value("echo", vec![json!(1)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, json!([1]));
        assert!(!connection.is_closed());
    }
}
