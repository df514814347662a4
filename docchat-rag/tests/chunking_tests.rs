//! Property tests for fixed-size chunking.

use std::path::PathBuf;

use docchat_rag::{Document, DocumentFormat, split};
use proptest::prelude::*;

fn document(id: usize, text: String) -> Document {
    Document {
        id: format!("doc{id}"),
        source_path: PathBuf::from(format!("/docs/doc{id}.txt")),
        format: DocumentFormat::Text,
        raw_text: text,
    }
}

/// Chunk sizes with a strictly smaller overlap.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|size| (Just(size), 0..size))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn non_overlapping_parts_reconstruct_each_document(
        texts in proptest::collection::vec("\\PC{0,120}", 1..5),
        (size, overlap) in arb_params(),
    ) {
        let docs: Vec<Document> =
            texts.into_iter().enumerate().map(|(i, t)| document(i, t)).collect();
        let chunks = split(&docs, size, overlap).unwrap();

        for doc in &docs {
            let own: Vec<_> = chunks.iter().filter(|c| c.document_id == doc.id).collect();
            let mut rebuilt = String::new();
            for (i, chunk) in own.iter().enumerate() {
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.text.chars().skip(skip));
            }
            prop_assert_eq!(&rebuilt, &doc.raw_text);
        }
    }

    #[test]
    fn windows_have_declared_size_and_overlap(
        text in "[a-zA-Z0-9 ]{1,200}",
        (size, overlap) in arb_params(),
    ) {
        let chunks = split(&[document(0, text.clone())], size, overlap).unwrap();
        let total = text.chars().count();

        prop_assert_eq!(chunks.first().unwrap().char_offset_start, 0);
        prop_assert_eq!(chunks.last().unwrap().char_offset_end, total);
        for chunk in &chunks {
            let len = chunk.char_offset_end - chunk.char_offset_start;
            prop_assert!(len <= size);
            prop_assert_eq!(chunk.text.chars().count(), len);
        }
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].char_offset_end - pair[0].char_offset_start, size);
            prop_assert_eq!(pair[0].char_offset_end - pair[1].char_offset_start, overlap);
        }
    }

    #[test]
    fn split_is_deterministic(
        texts in proptest::collection::vec("\\PC{0,80}", 0..4),
        (size, overlap) in arb_params(),
    ) {
        let docs: Vec<Document> =
            texts.into_iter().enumerate().map(|(i, t)| document(i, t)).collect();
        prop_assert_eq!(split(&docs, size, overlap).unwrap(), split(&docs, size, overlap).unwrap());
    }
}
