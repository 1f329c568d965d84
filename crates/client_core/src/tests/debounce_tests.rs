use std::sync::Arc;

use super::*;
use crate::test_support::program;

#[test]
fn default_delay_is_300ms() {
    assert_eq!(Debouncer::default().delay(), Duration::from_millis(300));
}

#[tokio::test]
async fn single_call_settles() {
    let debouncer = Debouncer::new(Duration::from_millis(5));
    assert!(debouncer.settle().await);
}

#[tokio::test]
async fn only_the_last_call_in_a_burst_settles() {
    let debouncer = Arc::new(Debouncer::new(Duration::from_millis(80)));

    let first = tokio::spawn({
        let debouncer = debouncer.clone();
        async move { debouncer.settle().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn({
        let debouncer = debouncer.clone();
        async move { debouncer.settle().await }
    });

    assert!(!first.await.expect("join first"));
    assert!(second.await.expect("join second"));
}

#[tokio::test]
async fn picker_returns_all_matches_without_sampling() {
    let programs: Vec<_> = (1..=5)
        .map(|id| program(id, &format!("Rust track {id}")))
        .chain([program(6, "Go track")])
        .collect();
    let picker = ProgramPicker::new(Duration::from_millis(1));

    let found = picker.query(&programs, "rust").await.expect("settled");
    assert_eq!(found.len(), 5);

    let everything = picker.query(&programs, "").await.expect("settled");
    assert_eq!(everything.len(), 6);
}
