//! Property-Based Tests for Paging Module
//!
//! Drives a sequencer with generated page sizes and checks its counters.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::paging::{PageProgress, PageSequencer};

/// Loads one page of `len` items and reports whether the fetch ran.
fn load(sequencer: &PageSequencer, cancel: &CancellationToken, len: usize) -> (Vec<u32>, bool) {
    let calls = AtomicUsize::new(0);
    let items = tokio_test::block_on(sequencer.load_next_page(cancel, |page| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, Infallible>(vec![page; len]) }
    }))
    .unwrap_or_else(|never| match never {});
    (items, calls.load(Ordering::SeqCst) == 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Successful loads advance the page by exactly one and never pass the ceiling.
    #[test]
    fn prop_page_monotonicity(
        per_page in 1u32..8,
        max_pages in 0u32..12,
        attempts in 0usize..20,
    ) {
        let sequencer = PageSequencer::new(per_page, max_pages);
        let cancel = CancellationToken::new();

        for _ in 0..attempts {
            let before = sequencer.current_page();
            let (_, fetched) = load(&sequencer, &cancel, per_page as usize);
            let after = sequencer.current_page();

            if fetched {
                prop_assert_eq!(after, before + 1);
            } else {
                prop_assert_eq!(after, before);
            }
            prop_assert!(after <= max_pages);
        }
    }

    // After a short page every later load is empty and never calls the fetch.
    #[test]
    fn prop_short_page_termination(
        per_page in 2u32..8,
        full_pages in 0usize..5,
        short_len in 0usize..2,
        extra_attempts in 1usize..5,
    ) {
        let sequencer = PageSequencer::new(per_page, 100);
        let cancel = CancellationToken::new();

        for _ in 0..full_pages {
            load(&sequencer, &cancel, per_page as usize);
        }
        prop_assert!(!sequencer.has_reached_end());

        let short = short_len.min(per_page as usize - 1);
        let (items, fetched) = load(&sequencer, &cancel, short);
        prop_assert!(fetched);
        prop_assert_eq!(items.len(), short);
        prop_assert!(sequencer.has_reached_end());

        let page = sequencer.current_page();
        for _ in 0..extra_attempts {
            let (items, fetched) = load(&sequencer, &cancel, per_page as usize);
            prop_assert!(items.is_empty());
            prop_assert!(!fetched);
        }
        prop_assert_eq!(sequencer.current_page(), page);
    }

    // Reset always lands on page 0 with the end flag clear, however often it runs.
    #[test]
    fn prop_reset_idempotence(
        lens in prop::collection::vec(0usize..6, 0..10),
        resets in 1usize..4,
    ) {
        let sequencer = PageSequencer::new(3, 6);
        let cancel = CancellationToken::new();
        for len in lens {
            load(&sequencer, &cancel, len);
        }

        for _ in 0..resets {
            sequencer.reset();
            prop_assert_eq!(
                sequencer.progress(),
                PageProgress { current_page: 0, has_reached_end: false }
            );
        }
    }

    // A cancelled caller never moves the counters and always gets nothing back.
    #[test]
    fn prop_cancellation_is_noop(
        lens in prop::collection::vec(0usize..6, 0..6),
        len in 0usize..6,
    ) {
        let sequencer = PageSequencer::new(3, 10);
        let live = CancellationToken::new();
        for len in lens {
            load(&sequencer, &live, len);
        }
        let before = sequencer.progress();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let (items, fetched) = load(&sequencer, &cancelled, len);

        prop_assert!(items.is_empty());
        prop_assert!(!fetched);
        prop_assert_eq!(sequencer.progress(), before);
    }
}
