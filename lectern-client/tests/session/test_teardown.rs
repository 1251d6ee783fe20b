use lectern_client::{SessionEvent, SessionState};
use lectern_core::{ClientFrame, Role, ServerFrame, SessionId};

use crate::fakes::*;
use crate::init_tracing;

#[tokio::test]
async fn leave_closes_links_stops_media_and_clears_state() {
    init_tracing();
    let mut rig = connect_rig(Role::Instructor).await;
    join_room(&mut rig, vec![]).await;
    let s1 = SessionId::new();
    let link = connect_peer(&mut rig, s1).await;

    rig.handle.leave();

    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::Leaving))
    })
    .await;
    rig.server
        .recv_matching(|f| matches!(f, ClientFrame::Leave))
        .await;
    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::Idle))
    })
    .await;

    assert!(wait_until(|| link.is_closed(), 2000).await);
    assert!(rig.media.all_tracks_stopped());

    // the driver is gone; the event stream ends and further commands are
    // harmless
    rig.handle.leave();
    assert!(
        wait_until(
            || {
                matches!(
                    rig.events.try_recv(),
                    Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
                )
            },
            2000,
        )
        .await,
        "the event stream ends with the driver"
    );
}

#[tokio::test]
async fn dropping_every_handle_leaves_gracefully() {
    init_tracing();
    let mut rig = connect_rig(Role::Student).await;
    join_room(&mut rig, vec![]).await;

    let handle = rig.handle.clone();
    drop(rig.handle);
    drop(handle);

    rig.server
        .recv_matching(|f| matches!(f, ClientFrame::Leave))
        .await;
    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::Idle))
    })
    .await;
}

#[tokio::test]
async fn chat_sends_echo_locally_and_receives_tagged_broadcasts() {
    init_tracing();
    let mut rig = connect_rig(Role::Student).await;

    let instructor = SessionId::new();
    join_room(&mut rig, vec![participant(instructor, "ada@uni.edu", Role::Instructor)]).await;

    rig.handle.send_chat("hello from s1");

    let sent = rig
        .server
        .recv_matching(|f| matches!(f, ClientFrame::Chat { .. }))
        .await;
    assert_eq!(
        sent,
        ClientFrame::Chat {
            message: "hello from s1".into()
        }
    );

    // the local echo carries our own identity
    let echo = event_matching(&mut rig.events, |e| matches!(e, SessionEvent::Chat(_))).await;
    match echo {
        SessionEvent::Chat(msg) => {
            assert_eq!(msg.from_email, "s1@uni.edu");
            assert_eq!(msg.message, "hello from s1");
        }
        _ => unreachable!(),
    }

    // an inbound broadcast is surfaced tagged with the sender
    rig.server
        .send(ServerFrame::Chat(lectern_core::ChatMessage {
            from_session_id: instructor,
            from_email: "ada@uni.edu".into(),
            from_name: "Ada".into(),
            from_role: Role::Instructor,
            message: "welcome".into(),
            timestamp: 1_700_000_000_000,
        }))
        .await;
    let incoming = event_matching(&mut rig.events, |e| matches!(e, SessionEvent::Chat(_))).await;
    match incoming {
        SessionEvent::Chat(msg) => {
            assert_eq!(msg.from_session_id, instructor);
            assert_eq!(msg.message, "welcome");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn a_departed_peer_is_cleaned_up() {
    init_tracing();
    let mut rig = connect_rig(Role::Instructor).await;
    join_room(&mut rig, vec![]).await;
    let s1 = SessionId::new();
    let link = connect_peer(&mut rig, s1).await;

    rig.server
        .send(ServerFrame::UserLeft { session_id: s1 })
        .await;

    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::ParticipantLeft(id) if *id == s1)
    })
    .await;
    assert!(wait_until(|| link.is_closed(), 2000).await);
}
