//! Match actors driven through the registry with tokio's paused clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use breach_match_server::config::MatchRules;
use breach_match_server::game::coordinator::IntentContext;
use breach_match_server::game::{MapLayout, MatchHooks, MatchRegistry, PlayerId};
use breach_match_server::ws::protocol::{ClientMsg, Intent, MatchPhase, RoundEndReason, ServerMsg, Team};
use tokio::sync::{broadcast, mpsc};
use tokio_test::assert_ok;
use uuid::Uuid;

fn quick_rules() -> MatchRules {
    MatchRules {
        countdown_ms: 100,
        loadout_selection_ms: 200,
        round_time_limit_ms: 1_000,
        round_transition_ms: 300,
        total_rounds: 2,
        role_switch_round: 1,
        ..MatchRules::default()
    }
}

async fn next_broadcast(rx: &mut broadcast::Receiver<ServerMsg>) -> ServerMsg {
    loop {
        match rx.recv().await {
            Ok(msg) => return msg,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("match closed"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn short_match_runs_to_completion_with_hooks() {
    let round_ends = Arc::new(AtomicUsize::new(0));
    let counter = round_ends.clone();
    let registry = MatchRegistry::new(quick_rules(), Arc::new(MapLayout::default())).with_hooks(
        move || {
            let counter = counter.clone();
            let mut hooks = MatchHooks::new();
            hooks.on_round_end(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            hooks
        },
    );

    let handle = registry.find_or_create(None);
    let mut rx = handle.subscribe();
    let cop = Uuid::new_v4();
    let criminal = Uuid::new_v4();
    let (cop_tx, _cop_rx) = mpsc::unbounded_channel();
    let (criminal_tx, _criminal_rx) = mpsc::unbounded_channel();
    assert_eq!(assert_ok!(handle.join(cop, Some("Ana".into()), cop_tx).await), Team::Cops);
    assert_eq!(assert_ok!(handle.join(criminal, None, criminal_tx).await), Team::Criminals);
    assert_eq!(registry.total_players(), 2);

    assert!(handle.send(cop, ClientMsg::StartMatch).await);

    let mut reasons = Vec::new();
    let mut switched = false;
    loop {
        match next_broadcast(&mut rx).await {
            ServerMsg::RoundEnd { reason, .. } => reasons.push(reason),
            ServerMsg::RoleSwitch { teams } => {
                assert!(teams.criminals.contains(&cop));
                switched = true;
            }
            ServerMsg::MatchEnd { .. } => break,
            _ => {}
        }
    }

    assert!(switched);
    assert_eq!(
        reasons,
        vec![RoundEndReason::TimerCopsWin, RoundEndReason::TimerCopsWin]
    );
    assert_eq!(round_ends.load(Ordering::SeqCst), 2);
    assert_eq!(handle.info().state, MatchPhase::MatchEnd);
}

#[tokio::test]
async fn intent_hook_answers_through_the_actor() {
    let registry = MatchRegistry::new(MatchRules::default(), Arc::new(MapLayout::default()))
        .with_hooks(|| {
            let mut hooks = MatchHooks::new();
            hooks.on_intent(
                |ctx: &mut IntentContext<'_>, player: PlayerId, intent: &Intent| match intent {
                    Intent::Surrender => Ok(vec![ServerMsg::error(
                        "surrendered",
                        format!("{} gave up in round {}", player, ctx.round),
                    )]),
                    other => Err(format!("{} refused", other.name())),
                },
            );
            hooks
        });

    let handle = registry.create_match();
    let mut rx = handle.subscribe();
    let player = Uuid::new_v4();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();
    assert_ok!(handle.join(player, None, direct_tx).await);
    assert!(matches!(direct_rx.recv().await, Some(ServerMsg::PlayerJoined { .. })));

    // Rejections come back on the player's own channel
    handle.send(player, ClientMsg::PlayerBreach).await;
    match direct_rx.recv().await {
        Some(ServerMsg::Error { code, error }) => {
            assert_eq!(code, "intent_rejected");
            assert!(error.contains("refused"));
        }
        other => panic!("expected a rejection, got {:?}", other),
    }

    // Accepted intents are broadcast to the whole match
    handle.send(player, ClientMsg::PlayerSurrender).await;
    loop {
        if let ServerMsg::Error { code, .. } = next_broadcast(&mut rx).await {
            assert_eq!(code, "surrendered");
            break;
        }
    }
}
