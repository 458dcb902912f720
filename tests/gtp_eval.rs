use go_arena::coord::Color;
use go_arena::gtp_client::GtpClient;
use go_arena::gtp_eval::GtpEvaluator;
use go_arena::prelude::*;

mod common;
use common::{write_dead_engine, write_engine, Fakes};

fn flags(engine: String) -> Flags {
    Flags {
        model: "/models/000020-local.pb".to_string(),
        gtp_client: engine,
        parallel_games: 4,
        virtual_losses: 2,
        ..Flags::default()
    }
}

#[test]
fn refused_moves_become_resignations() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new(50);
    let collaborators = fakes.collaborators();
    let flags = flags(write_engine(dir.path(), true));

    let report = GtpEvaluator::new(&collaborators, &flags).run().unwrap();

    // the local agent resigns its first move in every game
    assert_eq!(report.first.name, "fake-engine");
    assert_eq!(report.first.total_wins(), 4);
    assert_eq!(report.first.white_wins, 2);
    assert_eq!(report.first.black_wins, 2);
    assert_eq!(report.second.name, "000020-local");
    assert_eq!(report.second.total_wins(), 0);
}

#[test]
fn accepted_games_run_to_the_end() {
    let root = tempfile::tempdir().unwrap();
    let fakes = Fakes::new(8);
    let collaborators = fakes.collaborators();
    let flags = Flags {
        sgf_dir: root.path().join("sgf").to_string_lossy().into_owned(),
        ..flags(write_engine(root.path(), false))
    };

    let report = GtpEvaluator::new(&collaborators, &flags).run().unwrap();

    // scripted games always end with a black win: each side is black twice
    assert_eq!(report.first.black_wins, 2);
    assert_eq!(report.second.black_wins, 2);
    assert_eq!(report.first.white_wins + report.second.white_wins, 0);

    let records = fakes.records.writes.lock().unwrap();
    assert_eq!(records.len(), 4);
    for (_, record) in records.iter() {
        assert_eq!(record.moves.len(), 8);
        assert_eq!(record.result, "B+1.5");
    }
    // the engine opens with D4 in the games where it plays black
    let d4 = Move::from_gtp("D4", 19).unwrap();
    let engine_black = records
        .iter()
        .filter(|(_, record)| record.moves[0].mv == d4)
        .count();
    assert_eq!(engine_black, 2);
}

#[test]
fn dead_engine_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fakes = Fakes::new(8);
    let collaborators = fakes.collaborators();
    let flags = flags(write_dead_engine(dir.path()));

    assert!(GtpEvaluator::new(&collaborators, &flags).run().is_err());
}

#[test]
fn client_tracks_colors() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = GtpClient::launch(&write_engine(dir.path(), false), 19, 7.5).unwrap();
    assert_eq!(client.name().unwrap(), "fake-engine");
    assert_eq!(client.color(), Color::Black);
    assert!(client.play(Move::Pass).unwrap());
    assert_eq!(client.color(), Color::White);
    assert_eq!(client.gen_move().unwrap(), Move::from_gtp("D4", 19).unwrap());
    assert_eq!(client.color(), Color::Black);
}

#[test]
fn refusal_keeps_the_color() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = GtpClient::launch(&write_engine(dir.path(), true), 19, 7.5).unwrap();
    assert!(!client.play(Move::Pass).unwrap());
    assert_eq!(client.color(), Color::Black);
}
