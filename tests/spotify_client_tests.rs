use mockito::{Matcher, Server};
use serde_json::json;
use songlist_playlist::api::spotify::SpotifyClient;
use songlist_playlist::api::MusicService;
use songlist_playlist::error::MusicServiceError;

#[tokio::test]
async fn profile_is_read_from_me() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": "mock_user", "display_name": "Mock" }).to_string())
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let profile = client.fetch_profile("tok").await.expect("profile");
    assert_eq!(profile.id, "mock_user");
    assert_eq!(profile.display_name.as_deref(), Some("Mock"));
    m.assert_async().await;
}

#[tokio::test]
async fn expired_token_surfaces_provider_message() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/me")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "error": { "status": 401, "message": "The access token expired" } })
                .to_string(),
        )
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    match client.fetch_profile("old").await {
        Err(MusicServiceError::Status { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "The access token expired");
        }
        other => panic!("expected status error, got {:?}", other.map(|p| p.id)),
    }
}

#[tokio::test]
async fn search_takes_first_track_only() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "Bohemian Rhapsody - Queen".into()),
            Matcher::UrlEncoded("type".into(), "track".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "tracks": { "items": [
                { "id": "t1", "uri": "spotify:track:t1", "name": "Bohemian Rhapsody" }
            ] } })
            .to_string(),
        )
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let result = client
        .search_track("tok", "Bohemian Rhapsody - Queen")
        .await
        .expect("search");
    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].id, "t1");
    assert_eq!(result.matches[0].uri, "spotify:track:t1");
    m.assert_async().await;
}

#[tokio::test]
async fn search_with_no_items_is_not_an_error() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "tracks": { "items": [] } }).to_string())
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let result = client
        .search_track("tok", "Totally Fake Song XYZ123")
        .await
        .expect("search");
    assert!(result.matches.is_empty());
}

#[tokio::test]
async fn create_playlist_returns_public_url() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("POST", "/users/mock_user/playlists")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::PartialJson(json!({ "name": "Road Trip", "public": false })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "pl1",
                "name": "Road Trip",
                "external_urls": { "spotify": "https://open.spotify.com/playlist/pl1" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let pl = client
        .create_playlist("tok", "mock_user", "Road Trip")
        .await
        .expect("create");
    assert_eq!(pl.id, "pl1");
    assert_eq!(pl.name, "Road Trip");
    assert_eq!(pl.public_url, "https://open.spotify.com/playlist/pl1");
    m.assert_async().await;
}

#[tokio::test]
async fn add_tracks_posts_uris_in_order() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("POST", "/playlists/pl1/tracks")
        .match_body(Matcher::Json(
            json!({ "uris": ["spotify:track:a", "spotify:track:b"] }),
        ))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "snapshot_id": "s1" }).to_string())
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    client
        .add_tracks_to_playlist(
            "tok",
            "pl1",
            &["spotify:track:a".to_string(), "spotify:track:b".to_string()],
        )
        .await
        .expect("add");
    m.assert_async().await;
}

#[tokio::test]
async fn add_tracks_error_without_body_gets_generic_message() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/playlists/pl1/tracks")
        .with_status(500)
        .with_body("oops")
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let err = client
        .add_tracks_to_playlist("tok", "pl1", &["spotify:track:a".to_string()])
        .await
        .expect_err("should fail");
    assert_eq!(err.detail(), "add tracks failed");
    assert!(matches!(err, MusicServiceError::Status { status: 500, .. }));
}

#[tokio::test]
async fn ids_are_percent_encoded_in_paths() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/users/odd%2Fuser/playlists")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "pl/1",
                "name": "Mix",
                "external_urls": { "spotify": "https://open.spotify.com/playlist/pl1" }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let add = server
        .mock("POST", "/playlists/pl%2F1/tracks")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "snapshot_id": "s1" }).to_string())
        .create_async()
        .await;

    let client = SpotifyClient::new(&server.url());
    let pl = client
        .create_playlist("tok", "odd/user", "Mix")
        .await
        .expect("create");
    client
        .add_tracks_to_playlist("tok", &pl.id, &["spotify:track:a".to_string()])
        .await
        .expect("add");
    create.assert_async().await;
    add.assert_async().await;
}
