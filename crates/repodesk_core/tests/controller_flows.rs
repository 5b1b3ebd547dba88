use std::sync::{Arc, Mutex};

use repodesk_core::test_utils::{GatewayCall, MockGateway};
use repodesk_core::{
    BranchRef, ControllerEvent, ErrorKind, GatewayError, Origin, RemoteGateway, RepositoryRef,
    SaveOutcome, SyncController, SyncError,
};

const REPO: &str = "octo/site";

fn site() -> RepositoryRef {
    RepositoryRef::new("octo", "site", "main")
}

fn remote() -> MockGateway {
    MockGateway::new()
        .with_repository(site())
        .with_branch(REPO, BranchRef::new("main", "abc123"))
        .with_branch(REPO, BranchRef::new("dev", "def456"))
        .with_file(REPO, "main", "index.html", "<h1>main</h1>")
        .with_file(REPO, "main", "src/app.js", "main app")
        .with_file(REPO, "dev", "index.html", "<h1>dev</h1>")
        .with_file(REPO, "dev", "src/app.js", "dev app")
        .with_commit(REPO, "main", "abc123", "Initial commit")
        .with_commit(REPO, "dev", "def456", "Dev work")
}

async fn on_main(remote: &MockGateway) -> SyncController<MockGateway> {
    let controller = SyncController::new(remote.clone());
    controller.connect().await.unwrap();
    controller.select_repository(&site()).await.unwrap();
    controller
}

fn record_events(controller: &SyncController<MockGateway>) -> Arc<Mutex<Vec<ControllerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    controller.set_event_callback(Arc::new(move |event: &ControllerEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    events
}

// ==================== Selection & editing ====================

#[tokio::test]
async fn selecting_a_repository_loads_default_branch_and_entry_file() {
    let remote = remote();
    let controller = on_main(&remote).await;

    assert_eq!(controller.branch().unwrap().name, "main");
    assert_eq!(controller.commits()[0].sha, "abc123");

    let file = controller.selected_file().unwrap();
    assert_eq!(file.path, "index.html");
    assert_eq!(file.buffer, "<h1>main</h1>");
    assert!(!file.is_dirty());

    let names: Vec<_> = controller.nodes().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["index.html", "src"]);
}

#[tokio::test]
async fn repository_without_default_branch_falls_back_to_first() {
    let remote = MockGateway::new()
        .with_repository(RepositoryRef::new("octo", "old", "master"))
        .with_branch("octo/old", BranchRef::new("trunk", "t1"))
        .with_file("octo/old", "trunk", "README.md", "hi");
    let controller = SyncController::new(remote.clone());

    let branch = controller
        .select_repository(&RepositoryRef::new("octo", "old", "master"))
        .await
        .unwrap();
    assert_eq!(branch.unwrap().name, "trunk");
    // No index.html at the root, so nothing is selected.
    assert!(controller.selected_file().is_none());
}

#[tokio::test]
async fn dirty_tracks_every_edit() {
    let remote = remote();
    let controller = on_main(&remote).await;

    assert!(controller.set_buffer_content("<h1>edited</h1>").unwrap());
    assert!(controller.selected_file().unwrap().is_dirty());

    assert!(!controller.set_buffer_content("<h1>main</h1>").unwrap());
    assert!(!controller.selected_file().unwrap().is_dirty());
}

#[tokio::test]
async fn selecting_another_file_leaves_the_first_alone() {
    let remote = remote();
    let controller = on_main(&remote).await;
    controller.set_buffer_content("<h1>edited</h1>").unwrap();

    let src = controller.load_folder("src").await.unwrap();
    let app = controller.select_file(&src[0]).await.unwrap();
    assert_eq!(app.buffer, "main app");
    assert!(!app.is_dirty());

    let index = controller.file("index.html").unwrap();
    assert_eq!(index.buffer, "<h1>edited</h1>");
    assert!(index.is_dirty());
    assert_eq!(controller.selected_file().unwrap().path, "src/app.js");
}

#[tokio::test]
async fn directories_cannot_be_selected() {
    let remote = remote();
    let controller = on_main(&remote).await;
    let src = controller
        .nodes()
        .into_iter()
        .find(|n| n.is_dir())
        .unwrap();

    let err = controller.select_file(&src).await.unwrap_err();
    assert_eq!(err, SyncError::NotAFile("src".to_string()));
}

#[tokio::test]
async fn local_file_wins_over_remote_entry_file() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());
    controller
        .create_local_file("index.html", "index.html")
        .unwrap();
    controller.set_buffer_content("<h1>mine</h1>").unwrap();

    controller.select_repository(&site()).await.unwrap();

    let file = controller.selected_file().unwrap();
    assert_eq!(file.origin, Origin::LocalOnly);
    assert_eq!(file.buffer, "<h1>mine</h1>");
    assert_eq!(remote.call_count("get_file_content"), 0);
}

#[tokio::test]
async fn assistant_output_replaces_the_buffer() {
    let remote = remote();
    let controller = on_main(&remote).await;

    let applied = controller
        .apply_assistant(|code| Some(code.replace("main", "assistant")))
        .unwrap();
    assert!(applied);
    assert_eq!(
        controller.selected_file().unwrap().buffer,
        "<h1>assistant</h1>"
    );

    assert!(!controller.apply_assistant(|_| None).unwrap());
    assert!(controller.selected_file().unwrap().is_dirty());
}

// ==================== Saving ====================

#[tokio::test]
async fn local_save_without_repository_only_stages() {
    let remote = MockGateway::new();
    let controller = SyncController::new(remote.clone());

    let created = controller.create_local_file("notes.txt", "notes.txt").unwrap();
    assert_eq!(created.origin, Origin::LocalOnly);
    assert_eq!(created.buffer, "");
    controller.set_buffer_content("remember the milk").unwrap();

    let outcome = controller.save().await.unwrap();
    assert_eq!(outcome, SaveOutcome::RepositoryRequired { staged: 1 });
    assert!(remote.calls().is_empty());
    assert_eq!(
        controller.pending_entries(),
        vec![("notes.txt".to_string(), "remember the milk".to_string())]
    );
}

#[tokio::test]
async fn local_save_with_repository_stays_local() {
    let remote = remote();
    let controller = on_main(&remote).await;
    remote.clear_calls();

    controller.create_local_file("draft.md", "draft.md").unwrap();
    let outcome = controller.save().await.unwrap();

    assert_eq!(
        outcome,
        SaveOutcome::SavedLocally {
            path: "draft.md".to_string()
        }
    );
    assert!(!controller.selected_file().unwrap().is_dirty());
    assert!(controller.pending_entries().is_empty());
    assert!(remote.write_calls().is_empty());
}

#[tokio::test]
async fn saving_an_unedited_file_never_updates() {
    let remote = remote();
    let controller = on_main(&remote).await;

    let outcome = controller.save().await.unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::Unchanged {
            path: "index.html".to_string()
        }
    );
    assert_eq!(remote.call_count("update_file"), 0);
}

#[tokio::test]
async fn second_save_uses_hash_from_first() {
    let remote = remote();
    let controller = on_main(&remote).await;
    let original_sha = remote.file_sha(REPO, "main", "index.html");

    controller.set_buffer_content("v2").unwrap();
    let SaveOutcome::Saved { sha: first_sha, .. } = controller.save().await.unwrap() else {
        panic!("expected a remote save");
    };
    assert_ne!(first_sha, original_sha);
    assert!(!controller.selected_file().unwrap().is_dirty());

    controller.set_buffer_content("v3").unwrap();
    controller.save().await.unwrap();

    let tokens: Vec<_> = remote
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            GatewayCall::UpdateFile { known_sha, .. } => Some(known_sha),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec![original_sha, first_sha]);
    assert_eq!(
        remote.file_content(REPO, "main", "index.html").as_deref(),
        Some("v3")
    );

    // History was refreshed and the branch followed the new commits.
    let commits = controller.commits();
    assert_eq!(commits.len(), 3);
    assert_eq!(controller.branch().unwrap().head, Some(commits[0].sha.clone()));
}

#[tokio::test]
async fn failed_history_refresh_after_save_is_reported() {
    let remote = remote();
    let controller = on_main(&remote).await;

    controller.set_buffer_content("v2").unwrap();
    remote.fail_on("list_commits", GatewayError::Network("timed out".into()));
    let err = controller.save().await.unwrap_err();
    assert_eq!(err.gateway_kind(), Some(ErrorKind::Network));

    // The write itself landed and is recorded.
    assert_eq!(
        remote.file_content(REPO, "main", "index.html").as_deref(),
        Some("v2")
    );
    let file = controller.selected_file().unwrap();
    assert!(!file.is_dirty());
    assert_eq!(file.sha, remote.file_sha(REPO, "main", "index.html"));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn stale_hash_surfaces_as_conflict() {
    let remote = remote();
    let controller = on_main(&remote).await;

    // Someone else updates the file behind our back.
    let sha = remote.file_sha(REPO, "main", "index.html");
    remote
        .update_file("octo", "site", "index.html", "theirs", "m", sha.as_deref(), "main")
        .await
        .unwrap();

    controller.set_buffer_content("ours").unwrap();
    let err = controller.save().await.unwrap_err();
    assert_eq!(err.gateway_kind(), Some(ErrorKind::Conflict));

    let file = controller.selected_file().unwrap();
    assert_eq!(file.buffer, "ours");
    assert!(file.is_dirty());
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn push_with_repository_saves_and_reports() {
    let remote = remote();
    let controller = on_main(&remote).await;
    let events = record_events(&controller);

    controller.set_buffer_content("pushed").unwrap();
    let outcome = controller.push().await.unwrap();

    assert!(matches!(outcome, SaveOutcome::Saved { .. }));
    assert!(events.lock().unwrap().contains(&ControllerEvent::Pushed));
}

// ==================== Repository creation & flush ====================

#[tokio::test]
async fn push_then_flush_writes_exactly_once() {
    let remote = MockGateway::new();
    let controller = SyncController::new(remote.clone());
    let events = record_events(&controller);

    controller.create_local_file("a.txt", "a.txt").unwrap();
    controller.set_buffer_content("hi").unwrap();
    let outcome = controller.push().await.unwrap();
    assert_eq!(outcome, SaveOutcome::RepositoryRequired { staged: 1 });

    let report = controller
        .create_repository_and_flush("site2", "", false)
        .await
        .unwrap();
    assert_eq!(report.written, vec!["a.txt".to_string()]);
    assert!(report.refreshed);

    assert_eq!(
        remote.write_calls(),
        vec![
            GatewayCall::CreateRepository {
                name: "site2".to_string(),
                private: false,
            },
            GatewayCall::CreateFile {
                repo: "octo/site2".to_string(),
                path: "a.txt".to_string(),
                content: "hi".to_string(),
            },
        ]
    );
    // The post-flush refresh is the only other traffic.
    assert!(
        remote
            .calls()
            .iter()
            .filter(|c| !c.is_write())
            .all(|c| matches!(c.method(), "list_contents" | "list_commits"))
    );

    assert!(controller.pending_entries().is_empty());
    assert!(!controller.has_interrupted_flush());
    let file = controller.file("a.txt").unwrap();
    assert_eq!(file.origin, Origin::RemoteBacked);
    assert!(!file.is_dirty());

    let branch = controller.branch().unwrap();
    assert_eq!(branch.name, "main");
    assert_eq!(branch.head, Some(controller.commits()[0].sha.clone()));
    assert_eq!(controller.repositories()[0].name, "site2");

    let events = events.lock().unwrap();
    assert!(events.contains(&ControllerEvent::RepositoryRequired { staged: 1 }));
    assert!(events.contains(&ControllerEvent::Flushed {
        repository: "octo/site2".to_string(),
        files: 1,
    }));
}

#[tokio::test]
async fn failed_flush_stops_and_keeps_everything_staged() {
    let remote = MockGateway::new();
    let controller = SyncController::new(remote.clone());
    for name in ["a.txt", "b.txt", "c.txt"] {
        controller.create_local_file(name, name).unwrap();
        controller.set_buffer_content(format!("{name} body")).unwrap();
    }
    controller.push().await.unwrap();
    remote.fail_path("b.txt", GatewayError::Network("connection reset".into()));

    let err = controller
        .create_repository_and_flush("site2", "", false)
        .await
        .unwrap_err();
    assert_eq!(err.gateway_kind(), Some(ErrorKind::Network));

    let attempted: Vec<_> = remote
        .write_calls()
        .into_iter()
        .filter_map(|c| match c {
            GatewayCall::CreateFile { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(attempted, vec!["a.txt", "b.txt"]);
    assert_eq!(
        controller.pending_entries(),
        vec![
            ("a.txt".to_string(), "a.txt body".to_string()),
            ("b.txt".to_string(), "b.txt body".to_string()),
            ("c.txt".to_string(), "c.txt body".to_string()),
        ]
    );
    assert!(controller.has_interrupted_flush());
    assert!(remote.file_content("octo/site2", "main", "a.txt").is_some());
    assert!(!controller.is_busy());

    // Resuming skips what already landed.
    remote.clear_failures();
    let report = controller.retry_flush().await.unwrap();
    assert_eq!(report.skipped, vec!["a.txt".to_string()]);
    assert_eq!(report.written, vec!["b.txt".to_string(), "c.txt".to_string()]);
    assert!(controller.pending_entries().is_empty());
    assert_eq!(remote.call_count("create_repository"), 1);
    assert_eq!(
        remote.file_content("octo/site2", "main", "c.txt").as_deref(),
        Some("c.txt body")
    );
}

#[tokio::test]
async fn switching_repositories_abandons_an_interrupted_flush() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());
    controller.connect().await.unwrap();
    for name in ["a.txt", "b.txt"] {
        controller.create_local_file(name, name).unwrap();
        controller.set_buffer_content(format!("{name} body")).unwrap();
    }
    controller.push().await.unwrap();
    remote.fail_path("b.txt", GatewayError::Network("connection reset".into()));
    controller
        .create_repository_and_flush("site2", "", false)
        .await
        .unwrap_err();
    remote.clear_failures();

    controller.select_repository(&site()).await.unwrap();
    assert!(!controller.has_interrupted_flush());
    assert_eq!(
        controller.retry_flush().await.unwrap_err(),
        SyncError::NothingToRetry
    );

    // Nothing from site2 leaks into the active repository's workspace.
    assert_eq!(controller.repository(), Some(site()));
    let a = controller.file("a.txt").unwrap();
    assert_eq!(a.origin, Origin::LocalOnly);
    assert_eq!(a.sha, None);
    assert_eq!(remote.call_count("create_file"), 2);
}

#[tokio::test]
async fn retry_without_interrupted_flush_is_rejected() {
    let controller = SyncController::new(MockGateway::new());
    assert_eq!(
        controller.retry_flush().await.unwrap_err(),
        SyncError::NothingToRetry
    );
}

#[tokio::test]
async fn repository_names_are_checked_locally_first() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());

    assert!(!controller.check_repository_name("site").await.unwrap());
    assert!(controller.check_repository_name(" new-site ").await.unwrap());

    remote.clear_calls();
    let err = controller
        .create_repository_and_flush("bad name", "", true)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidName { .. }));
    assert!(remote.calls().is_empty());
}

// ==================== Branches & folders ====================

#[tokio::test]
async fn branch_switch_clears_folder_cache() {
    let remote = remote();
    let controller = on_main(&remote).await;

    controller.load_folder("src").await.unwrap();
    assert!(controller.cached_folder("src").is_some());

    controller
        .select_branch(&BranchRef::new("dev", "def456"))
        .await
        .unwrap();
    assert!(controller.cached_folder("src").is_none());
    assert_eq!(controller.cache_scope().unwrap().branch, "dev");
    assert_eq!(controller.selected_file().unwrap().buffer, "<h1>dev</h1>");

    remote.clear_calls();
    let listing = controller.load_folder("src").await.unwrap();
    assert_eq!(
        remote.calls(),
        vec![GatewayCall::ListContents {
            repo: REPO.to_string(),
            path: "src".to_string(),
            git_ref: "dev".to_string(),
        }]
    );
    assert_eq!(listing[0].path, "src/app.js");

    // Second expansion is served from the cache.
    controller.load_folder("src").await.unwrap();
    assert_eq!(remote.call_count("list_contents"), 1);
}

#[tokio::test]
async fn create_branch_selects_the_new_branch() {
    let remote = remote();
    let controller = on_main(&remote).await;
    let events = record_events(&controller);

    let created = controller.create_branch("feature-x").await.unwrap().unwrap();
    assert_eq!(created, BranchRef::new("feature-x", "abc123"));
    assert_eq!(controller.branch(), Some(created));
    assert!(
        controller
            .branches()
            .iter()
            .any(|b| b.name == "feature-x")
    );
    assert!(remote.calls().contains(&GatewayCall::CreateBranch {
        repo: REPO.to_string(),
        name: "feature-x".to_string(),
        base: "abc123".to_string(),
    }));
    assert_eq!(controller.cache_scope().unwrap().branch, "feature-x");
    assert!(events.lock().unwrap().contains(&ControllerEvent::BranchCreated {
        name: "feature-x".to_string()
    }));

    // The root listing carries over to the new branch.
    remote.clear_calls();
    let root = controller.load_folder("").await.unwrap();
    assert!(root.iter().any(|n| n.path == "index.html"));
    assert_eq!(remote.call_count("list_contents"), 0);
}

#[tokio::test]
async fn invalid_branch_names_never_reach_the_remote() {
    let remote = remote();
    let controller = on_main(&remote).await;
    remote.clear_calls();

    let err = controller.create_branch("bad..name").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidName { .. }));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn local_folders_exist_without_a_repository() {
    let remote = MockGateway::new();
    let controller = SyncController::new(remote.clone());

    controller.create_local_folder("assets", "assets").unwrap();
    controller
        .create_local_file("site.css", "assets/site.css")
        .unwrap();

    let listing = controller.load_folder("assets").await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].path, "assets/site.css");
    assert!(remote.calls().is_empty());

    let err = controller.create_local_folder("assets", "assets").unwrap_err();
    assert!(matches!(err, SyncError::InvalidName { .. }));
}

#[tokio::test]
async fn refresh_history_follows_new_commits() {
    let remote = remote();
    let controller = on_main(&remote).await;

    let sha = remote.file_sha(REPO, "main", "index.html");
    let write = remote
        .update_file("octo", "site", "index.html", "x", "m", sha.as_deref(), "main")
        .await
        .unwrap();

    let commits = controller.refresh_history().await.unwrap();
    assert_eq!(Some(commits[0].sha.clone()), write.commit);
    assert_eq!(controller.branch().unwrap().head, write.commit);
}

// ==================== Concurrency & failures ====================

#[tokio::test]
async fn second_intent_while_busy_is_rejected() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());
    controller.connect().await.unwrap();
    remote.hold("list_branches");

    let site_repo = site();
    let (selected, rejected) = tokio::join!(controller.select_repository(&site_repo), async {
        assert!(controller.is_busy());
        let calls_before = remote.calls().len();
        let result = controller.create_branch("feature-x").await;
        assert_eq!(remote.calls().len(), calls_before);
        remote.release("list_branches");
        result
    });

    assert_eq!(rejected.unwrap_err(), SyncError::Busy);
    assert!(selected.unwrap().is_some());
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn results_after_logout_are_discarded() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());
    controller.connect().await.unwrap();
    remote.hold("list_branches");

    let site_repo = site();
    let (selected, ()) = tokio::join!(controller.select_repository(&site_repo), async {
        controller.logout();
        remote.release("list_branches");
    });

    assert_eq!(selected.unwrap_err(), SyncError::Superseded);
    assert!(controller.user().is_none());
    assert!(controller.repository().is_none());
    assert!(controller.nodes().is_empty());
    assert!(controller.selected_file().is_none());
}

#[tokio::test]
async fn failed_reads_leave_the_workspace_untouched() {
    let remote = remote();
    let controller = on_main(&remote).await;
    let nodes_before = controller.nodes();
    let generation = controller.generation();

    remote.fail_on("list_commits", GatewayError::Network("timeout".into()));
    let err = controller
        .select_branch(&BranchRef::new("dev", "def456"))
        .await
        .unwrap_err();
    assert_eq!(err.gateway_kind(), Some(ErrorKind::Network));

    assert_eq!(controller.branch().unwrap().name, "main");
    assert_eq!(controller.nodes(), nodes_before);
    assert_eq!(controller.selected_file().unwrap().buffer, "<h1>main</h1>");
    assert_eq!(controller.cache_scope().unwrap().branch, "main");
    assert_eq!(controller.generation(), generation);

    remote.fail_on("list_contents", GatewayError::Auth("expired".into()));
    assert!(controller.load_folder("src").await.is_err());
    assert!(controller.cached_folder("src").is_none());
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn busy_changes_are_reported() {
    let remote = remote();
    let controller = SyncController::new(remote.clone());
    let events = record_events(&controller);

    controller.connect().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ControllerEvent::BusyChanged { busy: true },
            ControllerEvent::BusyChanged { busy: false },
        ]
    );
}
