//! # Session Flows
//!
//! The composed client against the stub engine: engine activity tracking,
//! SHM broadcast requests, snapshot delivery and the frame loop.
//!
//! ## Flow Tested:
//!
//! 1. **Handshake → Server**: the ready value becomes the typed server proxy
//! 2. **enginechange → frames**: activity gates frame pacing and SHM delivery
//! 3. **Binary frames → snapshot**: values are read at the subscribed position

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use ebeast_jsonipc::{ClientError, Connector, Session};

    use crate::{init_logging, Answer, Recorded, StubEngine};

    const WAIT: Duration = Duration::from_secs(5);

    async fn start(engine: &StubEngine, connector: &Connector) -> Session {
        timeout(WAIT, Session::start(connector, &engine.config()))
            .await
            .expect("session start timed out")
            .expect("session start failed")
    }

    /// Poll `check` until it holds
    async fn eventually<F: Fn() -> bool>(check: F) {
        timeout(WAIT, async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn broadcasts(engine: &StubEngine) -> Vec<Recorded> {
        engine.requests_for("broadcast_shm_fragments")
    }

    fn last_broadcast(engine: &StubEngine) -> Option<(Value, Value)> {
        broadcasts(engine)
            .last()
            .map(|r| (r.params[1].clone(), r.params[2].clone()))
    }

    #[tokio::test]
    async fn test_engine_activity_drives_shm_and_frames() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = Connector::default();
        let session = start(&engine, &connector).await;
        assert!(!session.is_engine_active());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = session.add_frame_handler(move |active| {
            sink.lock().push(active);
            true
        });
        assert_eq!(handle.id(), 0x200000);

        // inactive: one frame for the new handler
        eventually(|| seen.lock().len() == 1).await;
        assert_eq!(*seen.lock(), vec![false]);

        let level = session.shm_subscribe(64, 4);
        assert_eq!(level.position, 8);
        eventually(|| last_broadcast(&engine) == Some((json!([]), json!(0)))).await;

        // the engine starts
        let engine_events = engine.requests_for("Bse/EventHub/connect");
        assert_eq!(engine_events[0].params[1], json!("enginechange"));
        engine.set_engine_active(true);
        engine.emit(1, json!({"type": "enginechange", "active": true}));
        eventually(|| session.is_engine_active()).await;

        let expected = json!([{"bpos": 8, "blength": 4, "shmoffset": 64}]);
        eventually(|| last_broadcast(&engine) == Some((expected.clone(), json!(33)))).await;

        let mut block = vec![0u8; 12];
        block[8..12].copy_from_slice(&(-6.5f32).to_le_bytes());
        engine.send_binary(block);
        eventually(|| session.shm().is_snapshot_active()).await;
        assert_eq!(session.snapshot().f32_at(level.position), Some(-6.5));

        eventually(|| seen.lock().iter().any(|active| *active)).await;

        // the engine stops: one cleanup frame and delivery ends
        engine.emit(1, json!({"type": "enginechange", "active": false}));
        eventually(|| !session.is_engine_active()).await;
        eventually(|| last_broadcast(&engine) == Some((json!([]), json!(0)))).await;
        eventually(|| seen.lock().last() == Some(&false)).await;
        assert!(!session.shm().is_snapshot_active());
        assert_eq!(session.snapshot().f32_at(level.position), Some(0.0));

        timeout(WAIT, session.shutdown()).await.unwrap();
        assert_eq!(engine.requests_for("Bse/EventHub/disconnect").len(), 1);
        assert!(connector.current().is_none());
    }

    #[tokio::test]
    async fn test_short_snapshot_is_rejected() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.set_engine_active(true);
        let connector = Connector::default();
        let session = start(&engine, &connector).await;
        assert!(session.is_engine_active());

        let wide = session.shm_subscribe(128, 8);
        assert_eq!(wide.position, 8);
        assert_eq!(session.shm().binary_size(), 16);

        engine.send_binary(vec![1u8; 12]);
        engine.send_binary(vec![2u8; 16]);
        timeout(WAIT, session.connection().send_value("echo", vec![]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.binaries_sent(), 2);
        assert!(session.shm().is_snapshot_active());
        assert_eq!(session.snapshot().len(), 16);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_shared_ranges_send_one_broadcast_request() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.set_engine_active(true);
        let connector = Connector::default();
        let session = start(&engine, &connector).await;

        let outer = session.shm_subscribe(256, 16);
        eventually(|| !session.shm().is_pending()).await;
        let before = session.shm().resync_count();

        let inner = session.shm_subscribe(260, 4);
        assert_eq!(inner.index, outer.index);
        assert_eq!(inner.position, outer.position + 4);
        assert_eq!(session.shm().resync_count(), before);

        session.shm_unsubscribe(inner);
        assert!(!session.shm().is_pending());
        session.shm_unsubscribe(outer);
        eventually(|| session.shm().resync_count() > before).await;

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_engine_close_marks_engine_inactive() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.set_engine_active(true);
        let connector = Connector::default();
        let session = start(&engine, &connector).await;
        assert!(session.is_engine_active());

        engine.close();
        timeout(WAIT, session.connection().closed()).await.unwrap();
        eventually(|| !session.is_engine_active()).await;
        assert!(connector.current().is_none());
    }

    #[tokio::test]
    async fn test_second_session_on_same_connector_is_rejected() {
        init_logging();
        let engine = StubEngine::start().await;
        let connector = Connector::default();
        let session = start(&engine, &connector).await;

        let err = Session::start(&connector, &engine.config()).await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyOpen));

        session.shutdown().await;
        let again = start(&engine, &connector).await;
        again.shutdown().await;
        assert_eq!(engine.connections(), 2);
    }

    #[tokio::test]
    async fn test_handshake_without_server_fails_and_frees_connector() {
        init_logging();
        let engine = StubEngine::start().await;
        engine.on("$jsonipc.initialize", |_| {
            Answer::Result(json!({"$id": 5, "$class": "Bse::Project"}))
        });
        let connector = Connector::default();

        let err = timeout(WAIT, Session::start(&connector, &engine.config()))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResult { .. }));
        eventually(|| connector.current().is_none()).await;
    }
}
