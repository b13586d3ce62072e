//! End-to-end scan runs against mock ports.
//!
//! Tests cover:
//! - Full pipeline: fetch, indicators, signals, recent window, alert, state
//! - Continue-on-error for missing symbols and failed batches
//! - Fatal universe failure, and an empty universe that still completes
//! - A state save failure that does not fail the run
//! - Market clock gate, `--force`, and the minimum run interval
//! - Alert cooldown, empty-batch policy and failed sends
//! - Routing rule kinds to their own notification channel
//! - Resampling to a coarser target interval
//! - Deterministic universe order across worker threads

mod common;

use chrono::Duration;
use common::*;
use spxscan::domain::alert::{DispatchOutcome, MAIN_CHANNEL};
use spxscan::domain::scan::{ScanOrchestrator, ScanStatus, BATCH_SIZE};
use spxscan::domain::scan_state::ScanState;
use spxscan::domain::signal::SignalKind;

mod full_pipeline {
    use super::*;

    #[test]
    fn recent_cross_is_alerted_and_state_saved() {
        let config = scan_config("AAA, BBB", "");
        let universe = MockUniverse::new(&["AAA", "BBB"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.symbols_total, 2);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].symbol, "BBB");
        assert!(report.signals.iter().all(|s| s.symbol == "AAA"));
        assert!(report.signals.iter().any(|s| {
            s.kind == SignalKind::CrossOver && s.timestamp == open_now() - Duration::hours(1)
        }));
        assert_eq!(report.dispatch_outcome(MAIN_CHANNEL), Some(&DispatchOutcome::Sent));

        assert_eq!(notifier.count(), 1);
        assert!(notifier.sent.borrow()[0].contains("AAA"));

        let state = store.current();
        assert_eq!(state.last_run_at.unwrap(), open_now());
        assert_eq!(state.last_alert_at.unwrap(), open_now());
        assert_eq!(*store.saves.borrow(), 1);

        assert_eq!(*artifacts.symbols.lock().unwrap(), vec!["AAA", "BBB"]);
        let frames = artifacts.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "AAA");
        assert_eq!(frames[0].1.to_string(), "60m");
        assert_eq!(frames[0].2, CROSS_UP.len());
        assert!(!artifacts.results.lock().unwrap().is_empty());
        assert_eq!(artifacts.result_kinds.lock().unwrap().len(), 5);
    }

    #[test]
    fn stale_signals_are_not_alerted() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars(
            "AAA",
            hourly_bars(&CROSS_UP, open_now() - Duration::hours(10)),
        );
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.scanned, 1);
        assert!(report.signals.is_empty());
        assert_eq!(report.dispatch_outcome(MAIN_CHANNEL), Some(&DispatchOutcome::SuppressedEmpty));
        assert_eq!(notifier.count(), 0);
        assert!(store.current().last_run_at.is_some());
        assert!(store.current().last_alert_at.is_none());
    }

    #[test]
    fn empty_batch_is_sent_when_configured() {
        let config = scan_config("AAA", "[alert]\nnotify_on_empty = true\n");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.dispatch_outcome(MAIN_CHANNEL), Some(&DispatchOutcome::Sent));
        assert!(notifier.sent.borrow()[0].contains("No signals."));
    }
}

mod failures {
    use super::*;

    #[test]
    fn universe_failure_aborts_the_run() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::failing();
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let err = orchestrator.run(&store, open_now(), false).unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(data.calls(), 0);
        assert_eq!(notifier.count(), 0);
        assert_eq!(*store.saves.borrow(), 0);
    }

    #[test]
    fn failed_batch_skips_its_symbols() {
        let config = scan_config("AAA, BBB", "");
        let universe = MockUniverse::new(&["AAA", "BBB"]);
        let data = MockDataPort::new().failing();
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.scanned, 0);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[0].reason.contains("HTTP 429"));
    }

    #[test]
    fn unordered_series_is_skipped() {
        let config = scan_config("AAA, BBB", "");
        let universe = MockUniverse::new(&["AAA", "BBB"]);
        let mut shuffled = hourly_bars(&CROSS_UP, open_now());
        shuffled.swap(1, 2);
        let data = MockDataPort::new()
            .with_bars("AAA", shuffled)
            .with_bars("BBB", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.skipped[0].symbol, "AAA");
        assert!(report.signals.iter().all(|s| s.symbol == "BBB"));
    }

    #[test]
    fn failed_send_keeps_last_alert() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::failing();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert!(matches!(
            report.dispatch_outcome(MAIN_CHANNEL),
            Some(DispatchOutcome::Failed(_))
        ));
        assert!(store.current().last_alert_at.is_none());
        assert!(store.current().last_run_at.is_some());
    }

    #[test]
    fn failed_state_save_still_completes() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::failing_saves(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(
            report.dispatch_outcome(MAIN_CHANNEL),
            Some(&DispatchOutcome::Sent)
        );
        assert_eq!(notifier.count(), 1);
        assert!(report.state_error.as_deref().unwrap().contains("permission denied"));
        assert_eq!(store.current(), ScanState::default());
    }

    #[test]
    fn empty_universe_completes_with_empty_results() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&[]);
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.symbols_total, 0);
        assert_eq!(report.scanned, 0);
        assert_eq!(data.calls(), 0);
        assert!(artifacts.results.lock().unwrap().is_empty());
        assert_eq!(artifacts.result_kinds.lock().unwrap().len(), 5);
        assert_eq!(store.current().last_run_at.unwrap(), open_now());
    }
}

mod gating {
    use super::*;

    #[test]
    fn weekend_run_is_a_no_op_unless_forced() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, weekend_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, weekend_now(), false).unwrap();
        assert_eq!(report.status, ScanStatus::MarketClosed);
        assert_eq!(data.calls(), 0);
        assert_eq!(*store.saves.borrow(), 0);

        let forced = orchestrator.run(&store, weekend_now(), true).unwrap();
        assert_eq!(forced.status, ScanStatus::Completed);
        assert_eq!(data.calls(), 1);
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn recent_previous_run_is_skipped() {
        let config = scan_config("AAA", "[scan]\nmin_run_interval_minutes = 60\n");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let state = ScanState {
            last_run_at: Some((open_now() - Duration::minutes(30)).fixed_offset()),
            ..ScanState::default()
        };
        let store = MemoryStateStore::new(state.clone());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.status, ScanStatus::SkippedRecentRun);
        assert_eq!(data.calls(), 0);
        assert_eq!(store.current(), state);
    }

    #[test]
    fn alert_cooldown_is_respected() {
        let config = scan_config("AAA", "");
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let last_alert = (open_now() - Duration::minutes(30)).fixed_offset();
        let store = MemoryStateStore::new(ScanState {
            last_alert_at: Some(last_alert),
            ..ScanState::default()
        });

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert!(!report.signals.is_empty());
        assert_eq!(report.dispatch_outcome(MAIN_CHANNEL), Some(&DispatchOutcome::Throttled));
        assert_eq!(notifier.count(), 0);
        assert_eq!(store.current().last_alert_at, Some(last_alert));
        assert_eq!(store.current().last_run_at.unwrap(), open_now());
    }
}

mod channels {
    use super::*;

    #[test]
    fn routed_rule_alerts_its_own_channel() {
        let config = scan_config(
            "AAA",
            "[signals]\nrules = cross_over\n[channels]\ncross_over = cross\n",
        );
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let main = RecordingNotifier::new();
        let cross = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator = ScanOrchestrator::new(&config, &universe, &data, &artifacts, &main)
            .unwrap()
            .with_channel("cross", &cross);
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.dispatch.len(), 1);
        assert_eq!(report.dispatch_outcome("cross"), Some(&DispatchOutcome::Sent));
        assert_eq!(cross.count(), 1);
        assert!(cross.sent.borrow()[0].contains("[CrossOver]"));
        assert_eq!(main.count(), 0);

        let state = store.current();
        assert_eq!(state.last_alert_for("cross").unwrap(), open_now());
        assert!(state.last_alert_at.is_none());
    }

    #[test]
    fn routed_and_main_channels_split_one_batch() {
        let config = scan_config(
            "AAA",
            "[signals]\nrules = cross_over, threshold_buy\n[channels]\ncross_over = cross\n",
        );
        let universe = MockUniverse::new(&["AAA"]);
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&CROSS_UP, open_now()));
        let artifacts = RecordingArtifacts::default();
        let main = RecordingNotifier::new();
        let cross = RecordingNotifier::new();
        let last_cross = (open_now() - Duration::minutes(10)).fixed_offset();
        let mut state = ScanState::default();
        state.channel_alerts.insert("cross".into(), last_cross);
        let store = MemoryStateStore::new(state);

        let orchestrator = ScanOrchestrator::new(&config, &universe, &data, &artifacts, &main)
            .unwrap()
            .with_channel("cross", &cross);
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.dispatch_outcome("cross"), Some(&DispatchOutcome::Throttled));
        assert_eq!(cross.count(), 0);
        assert!(report.dispatch_outcome(MAIN_CHANNEL).is_some());
        assert_eq!(store.current().last_alert_for("cross"), Some(last_cross));
    }
}

mod resampling {
    use super::*;

    #[test]
    fn hourly_bars_are_scanned_as_two_hour_bars() {
        let config = scan_config(
            "AAA",
            "[scan]\nbase_interval = 60m\ntarget_interval = 2h\n",
        );
        let universe = MockUniverse::new(&["AAA"]);
        // 03:00 to 10:00 New York time.
        let closes = [10.0, 10.5, 11.0, 11.5, 12.0, 12.5, 13.0, 13.5];
        let data = MockDataPort::new().with_bars("AAA", hourly_bars(&closes, open_now()));
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.scanned, 1);
        let frames = artifacts.frames.lock().unwrap();
        assert_eq!(frames[0].1.to_string(), "2h");
        assert_eq!(frames[0].2, 5);
    }
}

mod ordering {
    use super::*;

    #[test]
    fn signals_follow_universe_order_across_workers() {
        let names: Vec<String> = (0..45).map(|i| format!("S{:02}", i)).collect();
        let config = scan_config(&names.join(","), "[scan]\nworkers = 4\n");
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let universe = MockUniverse::new(&refs);
        let data = names.iter().fold(MockDataPort::new(), |port, name| {
            port.with_bars(name, hourly_bars(&CROSS_UP, open_now()))
        });
        let artifacts = RecordingArtifacts::default();
        let notifier = RecordingNotifier::new();
        let store = MemoryStateStore::new(ScanState::default());

        let orchestrator =
            ScanOrchestrator::new(&config, &universe, &data, &artifacts, &notifier).unwrap();
        let report = orchestrator.run(&store, open_now(), false).unwrap();

        assert_eq!(report.scanned, 45);
        assert_eq!(data.calls(), names.len().div_ceil(BATCH_SIZE));
        let mut order: Vec<&str> = report.signals.iter().map(|s| s.symbol.as_str()).collect();
        order.dedup();
        assert_eq!(order, refs);
    }
}
