//! Property tests for scoring bounds and success-rate banding.

use proptest::prelude::*;
use ragbench_core::Document;
use ragbench_eval::crosslingual::success_rate;
use ragbench_eval::{Band, EvaluationResult, aggregate, faithfulness_score, relevance_score};

fn docs_strategy() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec("[a-zA-Z .,!?]{0,60}", 1..5)
        .prop_map(|texts| texts.into_iter().map(Document::new).collect())
}

proptest! {
    #[test]
    fn scores_stay_in_unit_interval(
        docs in docs_strategy(),
        answer in "[a-zA-Z .,!?]{0,80}",
        keywords in prop::collection::vec("[a-z]{1,8}", 0..6),
    ) {
        let relevance = relevance_score("q", &docs, Some(keywords.as_slice()));
        let faithfulness = faithfulness_score(&answer, &docs);
        prop_assert!((0.0..=1.0).contains(&relevance));
        prop_assert!((0.0..=1.0).contains(&faithfulness));
    }

    #[test]
    fn keywords_taken_from_docs_are_fully_relevant(docs in docs_strategy(), picks in prop::collection::vec(any::<prop::sample::Index>(), 1..4)) {
        let buffer: Vec<String> = docs
            .iter()
            .flat_map(|d| d.page_content.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        prop_assume!(!buffer.is_empty());
        let keywords: Vec<String> = picks.iter().map(|i| i.get(&buffer).to_uppercase()).collect();
        prop_assert_eq!(relevance_score("q", &docs, Some(keywords.as_slice())), 1.0);
    }

    #[test]
    fn answer_copied_from_docs_is_faithful(docs in docs_strategy()) {
        let answer = docs[0].page_content.clone();
        prop_assume!(!answer.is_empty());
        prop_assert_eq!(faithfulness_score(&answer, &docs), 1.0);
    }

    #[test]
    fn empty_evidence_scores_zero(answer in "[a-z ]{1,40}", keywords in prop::collection::vec("[a-z]{1,8}", 0..4)) {
        prop_assert_eq!(relevance_score("q", &[], Some(keywords.as_slice())), 0.0);
        prop_assert_eq!(faithfulness_score(&answer, &[]), 0.0);
    }

    #[test]
    fn band_is_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let rank = |band: Band| match band {
            Band::Fail => 0,
            Band::Partial => 1,
            Band::Pass => 2,
        };
        prop_assert!(rank(Band::from_rate(low)) <= rank(Band::from_rate(high)));
    }

    #[test]
    fn success_rate_is_a_percentage(total in 1usize..50, successes in 0usize..50) {
        let successes = successes.min(total);
        let rate = success_rate(successes, total);
        prop_assert!((0.0..=100.0).contains(&rate));
        prop_assert_eq!(rate == 100.0, successes == total);
    }

    #[test]
    fn aggregate_is_pure(latencies in prop::collection::vec(0.0f64..10.0, 1..10)) {
        let results: Vec<EvaluationResult> = latencies
            .iter()
            .map(|l| EvaluationResult {
                question: "q".into(),
                answer: "a".into(),
                expected_answer: None,
                sources: Vec::new(),
                latency_seconds: *l,
                relevance_score: Some(0.5),
                faithfulness_score: None,
            })
            .collect();
        let before = results.clone();
        let first = aggregate(&results).unwrap();
        prop_assert_eq!(Some(first), aggregate(&results));
        prop_assert_eq!(&results, &before);
        prop_assert_eq!(first.total_queries, results.len());
        prop_assert_eq!(first.avg_faithfulness_score, 0.0);
    }
}
