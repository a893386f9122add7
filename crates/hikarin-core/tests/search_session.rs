//! Search session lifecycle against the scripted engine

mod common;

use std::time::Duration;

use common::{AFTER_E4_FEN, START_FEN, ScriptedEngine, T_SHORT};
use hikarin_core::{Color, SearchController, SearchError, SearchLimits, SearchPoll, SessionState};

#[test]
fn black_side_score_is_reported_from_whites_view() {
    let engine = ScriptedEngine::new();
    engine.reply_to_go(&[
        "info depth 2 score cp 40 pv g8f6",
        "info depth 3 seldepth 5 score cp 150 pv d7d5 e4d5",
        "bestmove d7d5 ponder e4d5",
    ]);
    let mut conn = engine.connection();
    let mut searches = SearchController::new();

    let token = searches.start(&mut conn, AFTER_E4_FEN, 3, Color::Black);
    assert_eq!(token, 0);
    assert_eq!(searches.state(), SessionState::Running);

    let result = searches.wait(&mut conn, SearchLimits::default()).unwrap();
    assert_eq!(result.best_move, "d7d5");
    assert_eq!(result.ponder_move.as_deref(), Some("e4d5"));
    assert_eq!(result.final_evaluation, Some(-1.5));
    assert_eq!(result.mate_distance, None);
    assert_eq!(result.search_depth, 3);
    assert_eq!(result.principal_variation.as_deref(), Some("d7d5 e4d5"));
    assert_eq!(searches.state(), SessionState::Idle);

    let sent = engine.sent();
    assert!(sent.contains(&format!("position fen {AFTER_E4_FEN}")));
    assert!(sent.contains(&"go depth 3".to_string()));
}

#[test]
fn overlapping_searches_do_not_cross_resolve() {
    let engine = ScriptedEngine::new();
    engine.hold_searches(true);
    engine.reply_to_go(&["info depth 1 score cp 10", "bestmove a7a6"]);
    engine.reply_to_go(&["info depth 2 score cp 30", "bestmove b7b6"]);
    let mut conn = engine.connection();
    let mut searches = SearchController::new();

    assert_eq!(searches.start(&mut conn, AFTER_E4_FEN, 1, Color::Black), 0);
    assert_eq!(searches.start(&mut conn, AFTER_E4_FEN, 2, Color::Black), 1);
    assert!(engine.sent().contains(&"stop".to_string()));

    // 古い探索の出力は新しいセッションを解決しない
    engine.release_next();
    assert_eq!(searches.poll(), Ok(SearchPoll::Pending));

    engine.release_next();
    match searches.poll() {
        Ok(SearchPoll::Resolved(result)) => {
            assert_eq!(result.best_move, "b7b6");
            assert_eq!(result.final_evaluation, Some(-0.3));
            assert_eq!(result.search_depth, 2);
        }
        other => panic!("expected resolution, got {other:?}"),
    }
    assert_eq!(searches.poll(), Err(SearchError::Idle));
}

#[test]
fn depth_is_clamped_before_sending() {
    let engine = ScriptedEngine::new();
    let mut conn = engine.connection();
    let mut searches = SearchController::new();

    searches.start(&mut conn, START_FEN, 99, Color::White);
    searches.start(&mut conn, START_FEN, 0, Color::White);

    let gos: Vec<String> = engine
        .sent()
        .into_iter()
        .filter(|c| c.starts_with("go"))
        .collect();
    assert_eq!(gos, vec!["go depth 24", "go depth 1"]);
}

#[test]
fn stalled_engine_is_stopped_then_abandoned() {
    let engine = ScriptedEngine::new();
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, START_FEN, 3, Color::White);

    let limits = SearchLimits {
        soft: T_SHORT,
        grace: T_SHORT,
    };
    let err = searches.wait(&mut conn, limits).unwrap_err();
    assert_eq!(err, SearchError::Timeout(T_SHORT + T_SHORT));
    assert_eq!(
        engine.sent().iter().filter(|c| c.as_str() == "stop").count(),
        1
    );
    assert_eq!(searches.state(), SessionState::Idle);
}

fn timed_out(engine: &ScriptedEngine) -> (hikarin_core::EngineConnection, SearchController) {
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, START_FEN, 3, Color::White);
    let limits = SearchLimits {
        soft: T_SHORT,
        grace: T_SHORT,
    };
    assert!(matches!(
        searches.wait(&mut conn, limits),
        Err(SearchError::Timeout(_))
    ));
    assert_eq!(conn.outstanding_searches(), 1);
    (conn, searches)
}

#[test]
fn late_bestmove_brings_a_timed_out_connection_back() {
    let engine = ScriptedEngine::new();
    let (mut conn, mut searches) = timed_out(&engine);

    engine.emit("bestmove d2d4");
    assert_eq!(conn.outstanding_searches(), 0);

    engine.reply_to_go(&["info depth 2 score cp 30", "bestmove e2e4"]);
    searches.start(&mut conn, START_FEN, 2, Color::White);
    let result = searches.wait(&mut conn, SearchLimits::default()).unwrap();
    assert_eq!(result.best_move, "e2e4");
    assert_eq!(result.final_evaluation, Some(0.3));
}

#[test]
fn search_after_a_timeout_waits_for_the_overdue_bestmove() {
    let engine = ScriptedEngine::new();
    let (mut conn, mut searches) = timed_out(&engine);

    // 遅れた bestmove が来るまで新しい探索の出力は前の探索のものとして扱われる
    engine.reply_to_go(&["bestmove e2e4"]);
    searches.start(&mut conn, START_FEN, 2, Color::White);
    assert_eq!(searches.poll(), Ok(SearchPoll::Pending));
    assert_eq!(searches.state(), SessionState::Running);
    assert_eq!(conn.outstanding_searches(), 1);
}

#[test]
fn stop_answer_within_grace_resolves() {
    let engine = ScriptedEngine::new();
    engine.answer_stop_with("bestmove h7h6");
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, AFTER_E4_FEN, 3, Color::Black);

    let limits = SearchLimits {
        soft: T_SHORT,
        grace: Duration::from_secs(1),
    };
    let result = searches.wait(&mut conn, limits).unwrap();
    assert_eq!(result.best_move, "h7h6");
    assert_eq!(result.final_evaluation, None);
}

#[test]
fn poll_hands_out_the_result_once() {
    let engine = ScriptedEngine::new();
    engine.hold_searches(true);
    engine.reply_to_go(&["info depth 1 score mate 2 pv d8h4", "bestmove d8h4"]);
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, AFTER_E4_FEN, 1, Color::Black);

    assert_eq!(searches.poll(), Ok(SearchPoll::Pending));
    engine.release_next();
    assert_eq!(searches.pump(), Ok(SessionState::Resolved));
    assert_eq!(searches.state(), SessionState::Resolved);

    let result = searches.take_result().unwrap();
    assert_eq!(result.mate_distance, Some(2));
    assert_eq!(result.final_evaluation, None);
    assert!(searches.take_result().is_none());
}

#[test]
fn terminated_connection_fails_the_search() {
    let engine = ScriptedEngine::new();
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, START_FEN, 3, Color::White);
    conn.terminate();

    assert_eq!(
        searches.wait(&mut conn, SearchLimits::default()),
        Err(SearchError::Disconnected)
    );
}

#[test]
fn cancel_sends_stop_and_goes_idle() {
    let engine = ScriptedEngine::new();
    let mut conn = engine.connection();
    let mut searches = SearchController::new();
    searches.start(&mut conn, START_FEN, 3, Color::White);
    searches.cancel(&mut conn);

    assert_eq!(searches.state(), SessionState::Idle);
    assert_eq!(engine.sent().last().map(String::as_str), Some("stop"));
}
