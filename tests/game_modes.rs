mod common;

use std::time::Duration;

use claw_turn_server::game::{
    CommandRejected, Direction, GameMode, RemovalReason, RoundPhase, SchedulerEvent, Submitted,
    TurnEndReason,
};
use claw_turn_server::hardware::MachineEvent;
use claw_turn_server::modes::JoinRequest;
use tokio_test::assert_ok;

use common::{advance, secs, turn_ends, Harness};

#[tokio::test(start_paused = true)]
async fn tic_tac_toe_waits_for_two_players() {
    let h = Harness::new(GameMode::TicTacToe);
    h.join(&["alice"]);
    assert_eq!(h.current(), None);
    assert_eq!(h.scheduler.status().phase, RoundPhase::Idle);

    h.join(&["bob"]);
    assert_eq!(h.current(), Some((1, "alice".to_string())));
}

#[tokio::test(start_paused = true)]
async fn trivia_turn_is_spent_once_played() {
    let mut h = Harness::new(GameMode::Trivia);
    assert!(matches!(
        h.scheduler.join(JoinRequest::new("alice")),
        Err(CommandRejected::JoinDenied(_))
    ));

    assert!(h.scheduler.policy().grant_eligibility("Alice"));
    h.join(&["alice"]);
    let token = h.scheduler.current_token().unwrap();
    h.take_events();

    assert!(h.scheduler.end_turn(&token, TurnEndReason::Completed));
    let events = h.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::PlayerRemoved { player, reason: RemovalReason::TurnUsed, .. } if player == "alice"
    )));
    assert!(h.scheduler.status().players.is_empty());

    assert!(matches!(
        h.scheduler.join(JoinRequest::new("alice")),
        Err(CommandRejected::JoinDenied(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn team_members_drive_on_their_teams_turn() {
    let h = Harness::new(GameMode::TeamChaos);
    assert!(matches!(
        h.scheduler.join(JoinRequest::new("alice")),
        Err(CommandRejected::JoinDenied(_))
    ));

    let red = h
        .scheduler
        .join(JoinRequest::new("alice").with_team("red"))
        .unwrap();
    assert_eq!(red.identity, "red");
    h.scheduler
        .join(JoinRequest::new("bob").with_team("blue"))
        .unwrap();
    let again = h
        .scheduler
        .join(JoinRequest::new("dave").with_team("red"))
        .unwrap();
    assert!(again.already_queued);

    assert_eq!(h.current(), Some((1, "red".to_string())));
    assert_ok!(h.scheduler.submit_message("alice", "f"));
    assert_ok!(h.scheduler.submit_message("dave", "l"));
    assert_eq!(
        h.scheduler.submit_message("bob", "f"),
        Err(CommandRejected::NotYourTurn)
    );
    assert_eq!(
        h.scheduler.submit_message("carol", "f"),
        Err(CommandRejected::NotYourTurn)
    );
    assert!(matches!(
        h.scheduler.submit_message("alice", "gift turn blue"),
        Err(CommandRejected::Invalid(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn quick_queue_advances_once_drop_is_sent() {
    let mut h = Harness::new(GameMode::Quick);
    h.join(&["alice", "bob"]);

    h.scheduler.submit_message("alice", "f d").unwrap();
    advance(secs(1.0)).await;

    assert_eq!(h.current(), Some((2, "bob".to_string())));
    assert_eq!(
        turn_ends(&h.take_events()),
        vec![("alice".to_string(), 1, TurnEndReason::Completed)]
    );
    assert_eq!(h.machine.commands(), vec![Direction::Forward, Direction::Down]);
}

#[tokio::test(start_paused = true)]
async fn golf_hit_runs_whole_sequence_then_advances() {
    let mut h = Harness::new(GameMode::Golf);
    h.join(&["alice", "bob"]);

    assert!(matches!(
        h.scheduler.submit_message("alice", "d"),
        Err(CommandRejected::Invalid(_))
    ));
    assert_eq!(
        h.scheduler.submit_message("alice", "h"),
        Ok(Submitted::Queued {
            commands: 4,
            pending: 4
        })
    );
    advance(secs(1.0)).await;

    assert_eq!(
        h.machine.commands(),
        vec![
            Direction::Lower,
            Direction::Strike,
            Direction::Raise,
            Direction::CounterStrike
        ]
    );
    assert_eq!(h.current(), Some((2, "bob".to_string())));
    assert!(!h.scheduler.status().input_locked);
    assert_eq!(
        turn_ends(&h.take_events()),
        vec![("alice".to_string(), 1, TurnEndReason::Completed)]
    );
    assert_ok!(h.scheduler.submit_message("bob", "l"));
}

#[tokio::test(start_paused = true)]
async fn plinko_completes_on_recoil() {
    let mut h = Harness::new(GameMode::Plinko);
    h.join(&["alice", "bob"]);

    assert!(matches!(
        h.scheduler.submit_message("alice", "f"),
        Err(CommandRejected::Invalid(_))
    ));
    h.scheduler.submit_message("alice", "l d").unwrap();
    advance(secs(1.0)).await;
    h.take_events();

    h.machine.emit(MachineEvent::ReturnedHome);
    advance(Duration::from_millis(10)).await;
    assert_eq!(h.current(), Some((1, "alice".to_string())));

    h.machine.emit(MachineEvent::Recoiled);
    advance(Duration::from_millis(10)).await;
    assert_eq!(h.current(), Some((2, "bob".to_string())));
    assert_eq!(
        turn_ends(&h.take_events()),
        vec![("alice".to_string(), 1, TurnEndReason::Completed)]
    );
}
