// tests/property_debounce.rs

use std::time::Duration;

use proptest::prelude::*;
use simwatch::broadcast::Broadcaster;
use simwatch::watch::{spawn_debouncer, ChangeKind, Debounce, WatchNotification};
use simwatch_test_utils::fake_backend::RecordingRequester;
use tokio::sync::mpsc;
use tokio::time::Instant;

const WINDOW_MS: u64 = 100;

fn notification(i: usize) -> WatchNotification {
    WatchNotification {
        path: format!("source/file{i}.brs"),
        kind: ChangeKind::Modified,
    }
}

// Gaps between consecutive notifications, kept clear of the window edge.
fn gaps() -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(
        prop_oneof![0..WINDOW_MS - 5, WINDOW_MS + 5..3 * WINDOW_MS],
        0..12,
    )
}

fn expected_bursts(gaps: &[u64]) -> usize {
    1 + gaps.iter().filter(|&&g| g > WINDOW_MS).count()
}

proptest! {
    #[test]
    fn pure_debounce_closes_one_burst_per_quiet_period(gaps in gaps()) {
        let window = Duration::from_millis(WINDOW_MS);
        let mut debounce = Debounce::new(window);
        let mut now = Instant::now();
        let mut bursts = Vec::new();

        debounce.notify(now, notification(0));
        for (i, gap) in gaps.iter().enumerate() {
            now += Duration::from_millis(*gap);
            bursts.extend(debounce.poll(now));
            debounce.notify(now, notification(i + 1));
        }
        prop_assert!(debounce.poll(now).is_none());
        now += window;
        bursts.extend(debounce.poll(now));

        prop_assert_eq!(bursts.len(), expected_bursts(&gaps));
        prop_assert_eq!(bursts.iter().map(|b| b.events).sum::<usize>(), gaps.len() + 1);
        prop_assert_eq!(&bursts.last().unwrap().last, &notification(gaps.len()));
        prop_assert!(debounce.deadline().is_none());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn debouncer_task_requests_one_build_per_burst(gaps in gaps()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let requests = rt.block_on(async {
            let requester = RecordingRequester::new();
            let broadcaster = Broadcaster::new(64);
            let viewer = broadcaster.subscribe();
            let (tx, rx) = mpsc::channel(16);
            let task = spawn_debouncer(
                Duration::from_millis(WINDOW_MS),
                rx,
                requester.clone(),
                broadcaster,
            );

            tx.send(notification(0)).await.unwrap();
            for (i, gap) in gaps.iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(*gap)).await;
                tx.send(notification(i + 1)).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(3 * WINDOW_MS)).await;

            drop(tx);
            task.await.unwrap();

            let announced = simwatch_test_utils::viewer::drain(&viewer)
                .into_iter()
                .filter(|l| l.contains("rebuilding..."))
                .count();
            assert_eq!(announced, requester.count());
            requester.count()
        });

        prop_assert_eq!(requests, expected_bursts(&gaps));
    }
}

#[tokio::test(start_paused = true)]
async fn burst_announcement_names_last_change_and_extra_count() {
    let requester = RecordingRequester::new();
    let broadcaster = Broadcaster::new(64);
    let viewer = broadcaster.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let task = spawn_debouncer(
        Duration::from_millis(WINDOW_MS),
        rx,
        requester.clone(),
        broadcaster,
    );

    for i in 0..3 {
        tx.send(notification(i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(2 * WINDOW_MS)).await;
    drop(tx);
    task.await.unwrap();

    assert_eq!(requester.count(), 1);
    let lines = simwatch_test_utils::viewer::drain(&viewer);
    assert_eq!(
        lines,
        vec!["🔁 Detected change on source/file2.brs (+2 more), rebuilding...".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn closing_the_channel_flushes_an_open_burst() {
    let requester = RecordingRequester::new();
    let broadcaster = Broadcaster::new(64);
    let viewer = broadcaster.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let task = spawn_debouncer(
        Duration::from_millis(WINDOW_MS),
        rx,
        requester.clone(),
        broadcaster,
    );

    tx.send(notification(0)).await.unwrap();
    tx.send(notification(1)).await.unwrap();
    drop(tx);
    task.await.unwrap();

    assert_eq!(requester.count(), 1);
    assert_eq!(
        simwatch_test_utils::viewer::drain(&viewer),
        vec!["🔁 Detected change on source/file1.brs (+1 more), rebuilding...".to_string()]
    );
}
