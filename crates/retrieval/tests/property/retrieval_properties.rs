use chatmesh_core::store::SearchHit;
use chatmesh_retrieval::{ContextAssembler, RetrievalResult, dedup_by_content, normalize_scores, sanitize_score, sort_by_score};
use chatmesh_store::{InMemoryStore, StoredDocument};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn arb_results() -> impl Strategy<Value = Vec<RetrievalResult>> {
    prop::collection::vec(("[a-e]", -1.0f32..2.0), 0..20)
        .prop_map(|items| items.into_iter().map(|(c, s)| RetrievalResult::new(c, "src", s)).collect())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ── Scores ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sanitized_scores_are_finite_and_non_negative(score in prop::num::f32::ANY) {
        let s = sanitize_score(score);
        prop_assert!(s.is_finite() && s >= 0.0);
    }

    #[test]
    fn normalized_sets_fit_unit_range_in_the_same_order(raw in prop::collection::vec(0.0f32..50.0, 1..20)) {
        let mut results: Vec<RetrievalResult> =
            raw.iter().enumerate().map(|(i, s)| RetrievalResult::new(i.to_string(), "src", *s)).collect();
        normalize_scores(&mut results);
        prop_assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        for (i, a) in raw.iter().enumerate() {
            for (j, b) in raw.iter().enumerate() {
                if a > b {
                    prop_assert!(results[i].score >= results[j].score);
                }
            }
        }
    }

    #[test]
    fn sorted_scores_never_increase(mut results in arb_results()) {
        sort_by_score(&mut results);
        prop_assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn dedup_is_idempotent_and_order_preserving(results in arb_results()) {
        let once = dedup_by_content(results.clone());
        let twice = dedup_by_content(once.clone());
        prop_assert_eq!(&once, &twice);

        // first occurrences survive in their original relative order
        let positions: Vec<usize> = once
            .iter()
            .map(|r| results.iter().position(|x| x.content == r.content).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

// ── Context windows ─────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn window_takes_min_of_size_and_neighbours(len in 1u64..12, pick in 0u64..12, size in 0usize..5) {
        let center = pick % len + 1;
        let (before, after) = runtime().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            for section in 1..=len {
                store
                    .add("docs", StoredDocument::new(format!("s{section}"), json!({"chunk_id": format!("$5-{section}")})))
                    .await;
            }
            let assembler = ContextAssembler::new(store, "docs", "file_path", Duration::from_secs(5));
            let hit = SearchHit::from_wire(&json!({
                "_score": 0.5,
                "_source": {"text": format!("s{center}"), "metadata": {"chunk_id": format!("$5-{center}")}}
            }))
            .unwrap();
            let window = assembler.window(&hit, size).await.unwrap();
            (window.before, window.after)
        });

        let expected_before = size.min((center - 1) as usize);
        let expected_after = size.min((len - center) as usize);
        prop_assert_eq!(before.len(), expected_before);
        prop_assert_eq!(after.len(), expected_after);

        let sections = |v: &[String]| -> Vec<u64> { v.iter().map(|s| s[1..].parse().unwrap()).collect() };
        let b = sections(&before);
        let a = sections(&after);
        prop_assert!(b.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(a.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(b.iter().all(|s| *s < center));
        prop_assert!(a.iter().all(|s| *s > center));
    }
}
