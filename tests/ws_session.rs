mod support;

use futures_util::StreamExt;
use heretic_session::domain::{Role, SessionError};
use heretic_session::interface_adapters::protocol::{RejectReason, ServerFrame};
use heretic_session::use_cases::lobby::find_lobby;
use heretic_session::use_cases::{
    GameSettings, LauncherSignal, PeerCommand, PeerGame, SessionInfo, SessionLauncher,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn launch(launcher: &SessionLauncher<heretic_session::WsConnector>, name: &str) -> PeerGame {
    let launched = launcher.start(name).await.expect("join should succeed");
    PeerGame::new(
        launched,
        GameSettings {
            npc_count: 2,
            ..GameSettings::default()
        },
    )
}

#[tokio::test]
async fn when_third_peer_joins_full_room_then_room_full_signal_and_no_entity() {
    let base_url = support::ensure_server();
    let name = support::unique_session();
    let launcher = SessionLauncher::new(support::connector());

    let mut first = launch(&launcher, &name).await;
    let mut second = launch(&launcher, &name).await;
    let spawned = support::pump_until(&mut first, &mut second, |a, b| {
        avatar_count(a) == 2 && avatar_count(b) == 2
    })
    .await;
    assert!(spawned, "both peers should see both avatars");

    let mut signals = launcher.subscribe();
    let third = launcher.start(&name).await;
    assert!(matches!(third, Err(SessionError::RoomFull)));
    assert_eq!(signals.recv().await.ok(), Some(LauncherSignal::RoomFull));

    let info: SessionInfo = reqwest::get(format!("{base_url}/sessions/{name}"))
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("session info json");
    assert_eq!(info.peers, 2);
    assert_eq!(info.max_peers, 2);

    // The rejected peer left nothing behind.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    first.pump_network();
    assert_eq!(avatar_count(&first), 2);
    assert_eq!(first.session().peers().count(), 2);
}

fn avatar_count(game: &PeerGame) -> usize {
    game.session()
        .objects()
        .filter(|record| record.state.as_avatar().is_some())
        .count()
}

fn same_lobby(a: &PeerGame, b: &PeerGame) -> bool {
    let a = find_lobby(a.session()).map(|(id, _)| id);
    a.is_some() && a == find_lobby(b.session()).map(|(id, _)| id)
}

#[tokio::test]
async fn when_session_unknown_then_info_is_not_found() {
    let base_url = support::ensure_server();
    let name = support::unique_session();

    let res = reqwest::get(format!("{base_url}/sessions/{name}"))
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn when_session_name_is_short_then_relay_rejects_the_socket() {
    let base_url = support::ensure_server();
    let ws_url = format!("{}/ws?session=abc", base_url.replacen("http://", "ws://", 1));

    let (mut socket, _) = connect_async(ws_url.as_str())
        .await
        .expect("upgrade should succeed");
    let first = socket.next().await.expect("frame").expect("ok frame");
    let Message::Text(text) = first else {
        panic!("expected text frame, got {first:?}");
    };
    let frame: ServerFrame = serde_json::from_str(text.as_str()).expect("server frame");
    assert_eq!(
        frame,
        ServerFrame::Rejected {
            reason: RejectReason::InvalidSessionName
        }
    );
}

#[tokio::test]
async fn when_roles_are_picked_over_websocket_then_ready_starts_the_match() {
    let name = support::unique_session();
    let launcher = SessionLauncher::new(support::connector());
    let mut god = launch(&launcher, &name).await;
    let mut human = launch(&launcher, &name).await;

    let ready = support::pump_until(&mut god, &mut human, same_lobby).await;
    assert!(ready);

    assert!(god.handle_command(PeerCommand::SelectGod));
    assert!(human.handle_command(PeerCommand::SelectHuman));
    let selected = support::pump_until(&mut god, &mut human, |a, b| {
        a.lobby().is_some_and(|l| l.both_selected()) && b.lobby().is_some_and(|l| l.both_selected())
    })
    .await;
    assert!(selected, "both peers should observe both roles");

    assert!(human.handle_command(PeerCommand::Ready));
    let started = support::pump_until(&mut god, &mut human, |a, b| {
        a.lobby().is_some_and(|l| l.started) && b.lobby().is_some_and(|l| l.started)
    })
    .await;
    assert!(started, "both peers should observe the started match");
    assert_eq!(god.role(), Role::God);
    assert_eq!(human.role(), Role::Human);
}
