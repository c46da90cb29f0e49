//! End-to-end tests for the assembled engine.
//!
//! These exercise the full service facade against the in-memory fake
//! runtime and a manual clock: context lifecycle across runs and installs,
//! quota eviction, room fan-out, and the cleanup sweeps working together.

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use coderoom_utils::ManualClock;

    use crate::{
        config::EngineConfig,
        error::EngineError,
        membership::StaticMembership,
        payload::{ChunkStream, RoomChunk, RunRequest},
        runtime::fake::FakeRuntime,
        service::CodeRoomService,
    };

    struct Fixture {
        runtime: Arc<FakeRuntime>,
        clock: Arc<ManualClock>,
        service: CodeRoomService,
    }

    fn fixture_with(config: EngineConfig, membership: StaticMembership) -> Fixture {
        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::new());
        let service = CodeRoomService::with_runtime(
            config,
            Arc::new(membership),
            runtime.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            runtime,
            clock,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default(), StaticMembership::allow_all())
    }

    async fn next_output(session: &mut crate::room::SessionHandle) -> RoomChunk {
        loop {
            let chunk = tokio::time::timeout(Duration::from_secs(5), session.next_chunk())
                .await
                .expect("timed out waiting for room output")
                .expect("room closed while waiting for output");
            if chunk.stream != ChunkStream::System {
                return chunk;
            }
        }
    }

    #[tokio::test]
    async fn test_language_listing_excludes_inactive() {
        let fx = fixture();
        let languages = fx.service.list_languages();

        assert!(languages.iter().any(|l| l.name == "python"));
        assert!(languages.iter().all(|l| l.name != "rust"));

        let python = languages.iter().find(|l| l.name == "python").unwrap();
        assert!(python.supports_package_install);
        assert_eq!(python.extension, "py");
    }

    #[tokio::test]
    async fn test_run_after_install_in_one_context() {
        let fx = fixture();

        let ctx = fx
            .service
            .get_or_create_context("alice", "python")
            .await
            .unwrap();

        let outcomes = fx
            .service
            .install_packages(&ctx, &["requests".to_string()])
            .await
            .unwrap();
        assert!(outcomes[0].ok);

        fx.runtime.push_exec_output("", "", 0); // stage file
        fx.runtime.push_exec_output("", "", 0); // listing before
        fx.runtime.push_exec_output("200\n", "", 0); // run
        fx.runtime.push_exec_output("", "", 0); // listing after

        let output = fx
            .service
            .run_code(
                &ctx,
                RunRequest {
                    code: "import requests; print(200)".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "200\n");
        assert_eq!(output.exit_code, 0);

        // One sandbox served both operations.
        assert_eq!(fx.runtime.created_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_language_never_reaches_the_runtime() {
        let fx = fixture();

        let result = fx.service.get_or_create_context("alice", "cobol").await;

        assert!(matches!(result, Err(EngineError::UnsupportedLanguage(_))));
        assert_eq!(fx.runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn test_engine_outage_surfaces_as_unavailable() {
        let fx = fixture();
        fx.runtime.set_unavailable(true);

        let result = fx.service.get_or_create_context("alice", "python").await;
        assert!(matches!(result, Err(EngineError::ContainerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_quota_eviction_across_service_surface() {
        let fx = fixture_with(
            EngineConfig::default().with_max_contexts_per_owner(2),
            StaticMembership::allow_all(),
        );

        let python = fx
            .service
            .get_or_create_context("alice", "python")
            .await
            .unwrap();
        fx.clock.advance(Duration::from_secs(5));
        fx.service
            .get_or_create_context("alice", "javascript")
            .await
            .unwrap();
        fx.clock.advance(Duration::from_secs(5));
        fx.service
            .get_or_create_context("alice", "typescript")
            .await
            .unwrap();

        // Python was least recently used and got evicted.
        assert!(python.sandbox_id().is_none());
        assert_eq!(fx.service.stats().contexts, 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_room_fanout_through_the_service() {
        let fx = fixture();

        let alice = fx.service.join_room("study-room", "alice").await.unwrap();
        let mut bob = fx.service.join_room("study-room", "bob").await.unwrap();

        fx.service
            .send_room_input(&alice, b"print('hi')\n".to_vec())
            .await
            .unwrap();

        let chunk = next_output(&mut bob).await;
        assert!(chunk.text.contains("print('hi')"));

        fx.service.leave_room(&alice).await.unwrap();
        fx.service.leave_room(&bob).await.unwrap();
        assert_eq!(fx.service.stats().sessions, 0);
        assert_eq!(fx.service.stats().rooms, 1);
    }

    #[tokio::test]
    async fn test_denied_join_is_reported_before_any_sandbox_mutation() {
        let fx = fixture_with(
            EngineConfig::default(),
            StaticMembership::new().add_member("private-room", "alice"),
        );

        let result = fx.service.join_room("private-room", "mallory").await;

        assert!(matches!(result, Err(EngineError::RoomAccessDenied { .. })));
        assert_eq!(fx.runtime.created_count(), 0);

        // The legitimate member still gets in.
        assert!(fx.service.join_room("private-room", "alice").await.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn test_sweeps_and_stats_cover_both_registries() {
        let fx = fixture();

        fx.service
            .get_or_create_context("alice", "python")
            .await
            .unwrap();
        let session = fx.service.join_room("room-1", "alice").await.unwrap();
        fx.service.leave_room(&session).await.unwrap();

        let stats = fx.service.stats();
        assert_eq!(stats.contexts, 1);
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.sessions, 0);

        fx.clock.advance(Duration::from_secs(3601));
        let cleaned = fx.service.sweep_now().await;
        assert_eq!(cleaned.contexts_destroyed, 1);
        assert_eq!(cleaned.rooms_destroyed, 1);

        let stats = fx.service.stats();
        assert_eq!(stats.contexts, 0);
        assert_eq!(stats.rooms, 0);
    }

    #[tokio::test]
    async fn test_shutdown_destroys_everything() {
        let fx = fixture();

        fx.service
            .get_or_create_context("alice", "python")
            .await
            .unwrap();
        fx.service
            .get_or_create_context("bob", "go")
            .await
            .unwrap();
        let _session = fx.service.join_room("room-1", "carol").await.unwrap();

        let stats = fx.service.shutdown().await;
        assert_eq!(stats.contexts_destroyed, 2);
        assert_eq!(stats.rooms_destroyed, 1);
        assert_eq!(fx.runtime.destroyed().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_runs_on_one_context_serialize() {
        let fx = fixture();

        let ctx = fx
            .service
            .get_or_create_context("alice", "python")
            .await
            .unwrap();

        // Two runs race on the same context; the per-context lock makes
        // their exec sequences come out unbroken: stage, list, run, list
        // for one run, then the same for the other.
        let service = &fx.service;
        let (first, second) = tokio::join!(
            service.run_code(
                &ctx,
                RunRequest {
                    code: "print(1)".to_string(),
                    filename: Some("first.py".to_string()),
                    ..Default::default()
                },
            ),
            service.run_code(
                &ctx,
                RunRequest {
                    code: "print(2)".to_string(),
                    filename: Some("second.py".to_string()),
                    ..Default::default()
                },
            ),
        );
        first.unwrap();
        second.unwrap();

        let commands = fx.runtime.exec_commands();
        let first_stage = commands.iter().position(|c| c == "cat > first.py").unwrap();
        let first_run = commands
            .iter()
            .position(|c| c == "python3 -u first.py")
            .unwrap();
        let second_stage = commands.iter().position(|c| c == "cat > second.py").unwrap();
        let second_run = commands
            .iter()
            .position(|c| c == "python3 -u second.py")
            .unwrap();

        // One run's window never opens inside the other's.
        assert!(
            (first_run < second_stage) || (second_run < first_stage),
            "runs interleaved: {:?}",
            commands
        );
    }
}
