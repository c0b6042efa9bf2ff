use async_trait::async_trait;
use songlist_playlist::api::mock::{MockCall, MockFailures, MockMusicService};
use songlist_playlist::api::MusicService;
use songlist_playlist::builder::{BuildProgress, BuildStatus, PlaylistBuildJob, PlaylistBuildOrchestrator};
use songlist_playlist::error::{BuildError, MusicServiceError};
use songlist_playlist::models::{AuthSession, CreatedPlaylist, SearchResult, TrackMatch, UserProfile};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_NAME: &str = "My Awesome Playlist";

fn session() -> AuthSession {
    AuthSession {
        access_token: "tok".into(),
        refresh_token: "ref".into(),
        expires_at_ms: i64::MAX,
    }
}

fn job(titles: &[&str], name: &str) -> PlaylistBuildJob {
    PlaylistBuildJob::new(titles.iter().copied(), name, DEFAULT_NAME)
}

fn is_write(c: &MockCall) -> bool {
    matches!(c, MockCall::CreatePlaylist { .. } | MockCall::AddTracks { .. })
}

#[tokio::test]
async fn zero_matches_fails_without_creating_anything() {
    let service = Arc::new(MockMusicService::new());
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Totally Fake Song XYZ123"], "Mix");

    let err = orch.run(&mut j, &session()).await.expect_err("no matches");
    assert!(matches!(err, BuildError::NoMatches));
    assert_eq!(j.status(), BuildStatus::Failed);
    assert_eq!(j.error_message(), Some("couldn't find any of the songs"));
    assert!(j.resolved_uris().is_empty());
    assert!(!service.calls().iter().any(is_write));
}

#[tokio::test]
async fn unmatched_titles_are_skipped_and_order_is_kept() {
    let service = Arc::new(
        MockMusicService::new()
            .with_track("Song A", "a")
            .with_track("Song B", "b"),
    );
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Song A", "Unmatched", "Song B"], "Mix");

    let url = orch.run(&mut j, &session()).await.expect("build");
    assert_eq!(url, "https://open.example/playlist/mock-playlist");
    assert_eq!(j.status(), BuildStatus::Succeeded);
    assert_eq!(j.result_url(), Some(url.as_str()));
    assert_eq!(j.resolved_uris(), &["mock:track:a", "mock:track:b"]);

    assert_eq!(
        service.calls(),
        vec![
            MockCall::Search("Song A".into()),
            MockCall::Search("Unmatched".into()),
            MockCall::Search("Song B".into()),
            MockCall::FetchProfile,
            MockCall::CreatePlaylist {
                owner_id: "mock_user".into(),
                name: "Mix".into()
            },
            MockCall::AddTracks {
                playlist_id: "mock-playlist".into(),
                uris: vec!["mock:track:a".into(), "mock:track:b".into()]
            },
        ]
    );
}

#[tokio::test]
async fn empty_or_blank_input_is_rejected_before_searching() {
    let service = Arc::new(MockMusicService::new().with_track("x", "x"));
    let orch = PlaylistBuildOrchestrator::new(service.clone());

    let mut blank = PlaylistBuildJob::from_text("\n   \n\t\n", "Mix", DEFAULT_NAME);
    assert!(blank.titles().is_empty());
    let err = orch.run(&mut blank, &session()).await.expect_err("validation");
    assert!(matches!(err, BuildError::Validation(_)));
    assert_eq!(blank.status(), BuildStatus::Idle);

    let mut empty = job(&[], "Mix");
    assert!(matches!(
        orch.run(&mut empty, &session()).await,
        Err(BuildError::Validation(_))
    ));
    assert_eq!(empty.status(), BuildStatus::Idle);
    assert!(service.calls().is_empty());
}

#[test]
fn pasted_text_keeps_entries_as_entered() {
    let j = PlaylistBuildJob::from_text(
        "Bohemian Rhapsody - Queen\n\n  Hotel California - Eagles \n",
        "  ",
        DEFAULT_NAME,
    );
    assert_eq!(
        j.titles(),
        &["Bohemian Rhapsody - Queen", "  Hotel California - Eagles "]
    );
    assert_eq!(j.playlist_name(), DEFAULT_NAME);
    assert_eq!(j.status(), BuildStatus::Idle);
}

#[tokio::test]
async fn create_failure_is_fatal_and_skips_add() {
    let service = Arc::new(
        MockMusicService::new()
            .with_track("Song A", "a")
            .with_failures(MockFailures {
                create: Some("Insufficient client scope".into()),
                ..Default::default()
            }),
    );
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Song A"], "Mix");

    let err = orch.run(&mut j, &session()).await.expect_err("create fails");
    assert!(matches!(err, BuildError::PlaylistCreation(_)));
    assert_eq!(j.status(), BuildStatus::Failed);
    assert!(j.error_message().unwrap().contains("Insufficient client scope"));
    assert!(!service
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::AddTracks { .. })));
}

#[tokio::test]
async fn add_failure_leaves_created_playlist_in_place() {
    let service = Arc::new(
        MockMusicService::new()
            .with_track("Song A", "a")
            .with_failures(MockFailures {
                add: Some("rate limited".into()),
                ..Default::default()
            }),
    );
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Song A"], "Mix");

    let err = orch.run(&mut j, &session()).await.expect_err("add fails");
    match &err {
        BuildError::AddTracks { playlist_id, .. } => assert_eq!(playlist_id, "mock-playlist"),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(j.status(), BuildStatus::Failed);
    assert!(j.result_url().is_none());
    let calls = service.calls();
    assert!(calls.iter().any(|c| matches!(c, MockCall::CreatePlaylist { .. })));
    assert!(matches!(calls.last(), Some(MockCall::AddTracks { .. })));
}

#[tokio::test]
async fn search_error_halts_the_build() {
    let service = Arc::new(MockMusicService::new().with_failures(MockFailures {
        search: Some("service unavailable".into()),
        ..Default::default()
    }));
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["One", "Two"], "Mix");

    let err = orch.run(&mut j, &session()).await.expect_err("search fails");
    assert!(matches!(err, BuildError::Search { ref title, .. } if title == "One"));
    assert_eq!(service.calls(), vec![MockCall::Search("One".into())]);
    assert_eq!(j.status(), BuildStatus::Failed);
}

#[tokio::test]
async fn profile_failure_is_reported_as_profile_error() {
    let service = Arc::new(
        MockMusicService::new()
            .with_track("Song A", "a")
            .with_failures(MockFailures {
                profile: Some("The access token expired".into()),
                ..Default::default()
            }),
    );
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Song A"], "Mix");

    let err = orch.run(&mut j, &session()).await.expect_err("profile fails");
    assert!(matches!(err, BuildError::ProfileFetch(_)));
    assert!(!service.calls().iter().any(is_write));
}

#[tokio::test]
async fn progress_is_reported_per_title_then_per_phase() {
    let service = Arc::new(MockMusicService::new().with_track("Song A", "a"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = PlaylistBuildOrchestrator::new(service).with_progress(tx);
    let mut j = job(&["Song A", "Nope"], "Mix");
    orch.run(&mut j, &session()).await.expect("build");
    drop(orch);

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert_eq!(
        events,
        vec![
            BuildProgress::Searching { index: 1, total: 2, title: "Song A".into() },
            BuildProgress::Searching { index: 2, total: 2, title: "Nope".into() },
            BuildProgress::CreatingPlaylist,
            BuildProgress::AddingTracks { count: 1, playlist_name: "Mix".into() },
            BuildProgress::Succeeded {
                url: "https://open.example/playlist/mock-playlist".into()
            },
        ]
    );
    assert_eq!(events[0].to_string(), "Searching for song 1/2: \"Song A\"");
}

#[tokio::test]
async fn configured_batch_size_chunks_the_add_phase() {
    let mut service = MockMusicService::new();
    let titles: Vec<String> = (1..=5).map(|i| format!("Song {}", i)).collect();
    for (i, t) in titles.iter().enumerate() {
        service = service.with_track(t, &format!("{}", i + 1));
    }
    let service = Arc::new(service);
    let orch = PlaylistBuildOrchestrator::new(service.clone()).with_add_batch_size(Some(2));
    let mut j = PlaylistBuildJob::new(titles.clone(), "Mix", DEFAULT_NAME);
    orch.run(&mut j, &session()).await.expect("build");

    let adds: Vec<Vec<String>> = service
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::AddTracks { uris, .. } => Some(uris),
            _ => None,
        })
        .collect();
    assert_eq!(
        adds,
        vec![
            vec!["mock:track:1".to_string(), "mock:track:2".to_string()],
            vec!["mock:track:3".to_string(), "mock:track:4".to_string()],
            vec!["mock:track:5".to_string()],
        ]
    );
}

#[tokio::test]
async fn second_run_while_one_is_in_flight_is_refused() {
    let service = Arc::new(
        MockMusicService::new()
            .with_track("Song A", "a")
            .with_search_delay(Duration::from_millis(200)),
    );
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let s = session();
    let mut first = job(&["Song A"], "First");
    let mut second = job(&["Song A"], "Second");

    let (r1, r2) = tokio::join!(orch.run(&mut first, &s), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orch.run(&mut second, &s).await
    });
    assert!(r1.is_ok());
    assert!(matches!(r2, Err(BuildError::AlreadyRunning)));
    assert_eq!(second.status(), BuildStatus::Idle);

    // guard is released once the first run finishes
    let mut third = job(&["Song A"], "Third");
    assert!(orch.run(&mut third, &s).await.is_ok());
}

#[tokio::test]
async fn finished_job_cannot_be_rerun() {
    let service = Arc::new(MockMusicService::new());
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    let mut j = job(&["Nothing"], "Mix");
    let _ = orch.run(&mut j, &session()).await;
    assert_eq!(j.status(), BuildStatus::Failed);

    let calls_before = service.calls().len();
    assert!(matches!(
        orch.run(&mut j, &session()).await,
        Err(BuildError::Validation(_))
    ));
    assert_eq!(j.status(), BuildStatus::Failed);
    assert_eq!(service.calls().len(), calls_before);
}

/// Each token belongs to its own user; records the owner of every playlist.
#[derive(Default)]
struct PerTokenService {
    owners: Mutex<Vec<String>>,
}

#[async_trait]
impl MusicService for PerTokenService {
    fn name(&self) -> &str {
        "per-token"
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, MusicServiceError> {
        if token == "dead" {
            return Err(MusicServiceError::Status {
                status: 401,
                message: "The access token expired".into(),
            });
        }
        Ok(UserProfile {
            id: format!("user-of-{}", token),
            display_name: None,
        })
    }

    async fn search_track(&self, _token: &str, title: &str) -> Result<SearchResult, MusicServiceError> {
        Ok(SearchResult {
            matches: vec![TrackMatch {
                id: title.to_string(),
                uri: format!("test:track:{}", title),
            }],
        })
    }

    async fn create_playlist(
        &self,
        _token: &str,
        owner_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist, MusicServiceError> {
        self.owners.lock().unwrap().push(owner_id.to_string());
        Ok(CreatedPlaylist {
            id: format!("pl-{}", owner_id),
            name: name.to_string(),
            public_url: format!("https://open.example/playlist/pl-{}", owner_id),
        })
    }

    async fn add_tracks_to_playlist(
        &self,
        _token: &str,
        _playlist_id: &str,
        _uris: &[String],
    ) -> Result<(), MusicServiceError> {
        Ok(())
    }
}

fn session_with_token(token: &str) -> AuthSession {
    AuthSession {
        access_token: token.into(),
        refresh_token: String::new(),
        expires_at_ms: i64::MAX,
    }
}

#[tokio::test]
async fn each_run_creates_the_playlist_under_its_own_session_owner() {
    let service = Arc::new(PerTokenService::default());
    let orch = PlaylistBuildOrchestrator::new(service.clone());

    let mut first = job(&["Song A"], "Alice Mix");
    orch.run(&mut first, &session_with_token("alice")).await.expect("alice build");
    let mut second = job(&["Song A"], "Bob Mix");
    orch.run(&mut second, &session_with_token("bob")).await.expect("bob build");

    assert_eq!(
        *service.owners.lock().unwrap(),
        vec!["user-of-alice".to_string(), "user-of-bob".to_string()]
    );
}

#[tokio::test]
async fn dead_token_after_a_good_run_still_reports_profile_failure() {
    let service = Arc::new(PerTokenService::default());
    let orch = PlaylistBuildOrchestrator::new(service.clone());

    let mut ok = job(&["Song A"], "Mix");
    orch.run(&mut ok, &session_with_token("alice")).await.expect("build");

    let mut stale = job(&["Song A"], "Mix");
    let err = orch
        .run(&mut stale, &session_with_token("dead"))
        .await
        .expect_err("profile fetch must fail");
    assert!(matches!(err, BuildError::ProfileFetch(_)));
    assert_eq!(service.owners.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn profile_is_fetched_on_every_run() {
    let service = Arc::new(MockMusicService::new().with_track("Song A", "a"));
    let orch = PlaylistBuildOrchestrator::new(service.clone());
    for name in ["One", "Two"] {
        let mut j = job(&["Song A"], name);
        orch.run(&mut j, &session()).await.expect("build");
    }
    let fetches = service
        .calls()
        .iter()
        .filter(|c| matches!(c, MockCall::FetchProfile))
        .count();
    assert_eq!(fetches, 2);
}
