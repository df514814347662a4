//! Property tests for vector index search ordering and clamping.

use std::collections::HashMap;

use docchat_rag::document::Chunk;
use docchat_rag::index::{IndexEntry, Similarity, VectorIndex};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_entries(dim: usize) -> impl Strategy<Value = Vec<IndexEntry>> {
    proptest::collection::vec(("[a-z ]{5,30}", arb_normalized_embedding(dim)), 1..20).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, embedding))| {
                    IndexEntry::new(
                        Chunk {
                            id: format!("doc_1_{i}"),
                            document_id: "doc_1".to_string(),
                            char_offset_start: 0,
                            char_offset_end: text.len(),
                            text,
                            metadata: HashMap::new(),
                        },
                        embedding,
                    )
                })
                .collect()
        },
    )
}

fn arb_similarity() -> impl Strategy<Value = Similarity> {
    prop_oneof![Just(Similarity::Cosine), Just(Similarity::Euclidean)]
}

mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_clamped(
            entries in arb_entries(DIM),
            query in arb_normalized_embedding(DIM),
            similarity in arb_similarity(),
            k in 1usize..25,
        ) {
            let count = entries.len();
            let index = VectorIndex::build_with(entries, similarity).unwrap();
            let results = index.search(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }

        #[test]
        fn oversized_k_returns_every_entry_once(
            entries in arb_entries(DIM),
            query in arb_normalized_embedding(DIM),
        ) {
            let count = entries.len();
            let index = VectorIndex::build(entries).unwrap();
            let results = index.search(&query, count + 10).unwrap();

            let mut ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), count);
        }

        #[test]
        fn equal_scores_keep_build_order(
            vector in arb_normalized_embedding(DIM),
            copies in 2usize..10,
        ) {
            let entries: Vec<IndexEntry> = (0..copies)
                .map(|i| IndexEntry::new(
                    Chunk {
                        id: format!("c{i:02}"),
                        document_id: "d".to_string(),
                        text: String::new(),
                        char_offset_start: 0,
                        char_offset_end: 0,
                        metadata: HashMap::new(),
                    },
                    vector.clone(),
                ))
                .collect();
            let index = VectorIndex::build(entries).unwrap();
            let results = index.search(&vector, copies).unwrap();

            let ids: Vec<String> = results.iter().map(|r| r.chunk.id.clone()).collect();
            let expected: Vec<String> = (0..copies).map(|i| format!("c{i:02}")).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
