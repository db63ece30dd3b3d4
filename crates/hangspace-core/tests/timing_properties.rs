//! Property tests for debounce-driven components.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use hangspace_core::{
    SearchConfig, SearchSession, TypingConfig, TypingCoordinator, search::DEFAULT_SEARCH_DEBOUNCE,
    typing::DEFAULT_TYPING_DEBOUNCE,
};
use hangspace_proto::ChatId;
use proptest::prelude::*;

proptest! {
    /// Any burst of keystrokes spaced closer than the debounce, followed by
    /// silence, yields exactly one start and one stop.
    #[test]
    fn keystroke_burst_emits_one_start_one_stop(
        gaps in prop::collection::vec(0u64..1000, 1..30)
    ) {
        let t0 = Instant::now();
        let chat = ChatId::from("c1");
        let mut typing = TypingCoordinator::new(TypingConfig::default());

        let mut now = t0;
        let mut emits = Vec::new();
        for gap in gaps {
            now += Duration::from_millis(gap);
            emits.extend(typing.keystroke(&chat, now));
            emits.extend(typing.poll_local(now));
        }
        for step in 1..=30 {
            emits.extend(typing.poll_local(now + Duration::from_millis(step * 100)));
        }

        let starts = emits.iter().filter(|e| e.is_typing).count();
        let stops = emits.iter().filter(|e| !e.is_typing).count();
        prop_assert_eq!(starts, 1);
        prop_assert_eq!(stops, 1);
    }

    /// Queries typed closer together than the debounce produce exactly one
    /// request, for the last query.
    #[test]
    fn rapid_queries_fire_once(
        queries in prop::collection::vec(("[a-z]{1,6}", 0u64..500), 1..10)
    ) {
        let t0 = Instant::now();
        let mut search = SearchSession::new(SearchConfig::default());

        let mut now = t0;
        let mut fired = Vec::new();
        let mut last = String::new();
        for (query, gap) in &queries {
            now += Duration::from_millis(*gap);
            search.input(query, now);
            fired.extend(search.tick(now));
            last.clone_from(query);
        }
        fired.extend(search.tick(now + DEFAULT_SEARCH_DEBOUNCE));
        fired.extend(search.tick(now + DEFAULT_SEARCH_DEBOUNCE * 4));

        prop_assert_eq!(fired.len(), 1);
        prop_assert_eq!(&fired[0].query, &last);
    }

    /// Whatever order responses arrive in, only the newest token is applied.
    #[test]
    fn only_newest_response_applies(
        count in 2usize..8,
        order in prop::collection::vec(any::<prop::sample::Index>(), 8)
    ) {
        let mut search = SearchSession::<Instant>::new(SearchConfig::default());
        let t0 = Instant::now();

        let mut tokens = Vec::new();
        for i in 0..count {
            search.input(&format!("q{i}"), t0);
            tokens.push(search.submit().unwrap().token);
        }
        let newest = *tokens.last().unwrap();

        let mut applied = Vec::new();
        for index in order.iter().take(count) {
            let token = tokens[index.index(tokens.len())];
            if search.apply_response(token, Ok(Vec::new())) {
                applied.push(token);
            }
        }
        if !applied.contains(&newest) {
            applied.extend(search.apply_response(newest, Ok(Vec::new())).then_some(newest));
        }

        prop_assert_eq!(applied, vec![newest]);
    }
}

#[test]
fn debounce_constants() {
    assert_eq!(DEFAULT_TYPING_DEBOUNCE, Duration::from_millis(1000));
    assert_eq!(DEFAULT_SEARCH_DEBOUNCE, Duration::from_millis(500));
}
