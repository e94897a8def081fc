//! Property tests for the recursive chunker.

use orchard_rag::chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
use proptest::prelude::*;

/// Generate text made of short words separated by spaces, line breaks and
/// paragraph breaks.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        ("[a-z]{1,8}", prop_oneof![Just(" "), Just("\n"), Just("\n\n")]),
        1..120,
    )
    .prop_map(|words| {
        let mut text = String::new();
        for (i, (word, sep)) in words.iter().enumerate() {
            if i > 0 {
                text.push_str(sep);
            }
            text.push_str(word);
        }
        text
    })
}

/// Generate a chunk size, an overlap anywhere up to `size - 1`, and text
/// whose words may be longer than the chunk size.
fn arb_wide_case() -> impl Strategy<Value = (String, usize, usize)> {
    (2usize..60).prop_flat_map(|size| {
        let short = proptest::string::string_regex("[a-z]{1,6}").unwrap();
        let long = proptest::string::string_regex(&format!("[a-z]{{1,{}}}", size * 2)).unwrap();
        let separator = prop_oneof![Just(" "), Just("  "), Just("\n"), Just("\n\n"), Just(" \n ")];
        let words = proptest::collection::vec((prop_oneof![3 => short, 1 => long], separator), 1..80);
        (words, Just(size), 0..size).prop_map(|(words, size, overlap)| {
            let mut text = String::new();
            for (i, (word, sep)) in words.iter().enumerate() {
                if i > 0 {
                    text.push_str(sep);
                }
                text.push_str(word);
            }
            (text, size, overlap)
        })
    })
}

/// Length from `pos` through the end of the next word, leading whitespace included.
fn next_token_len(text: &str, pos: usize) -> usize {
    let rest = &text[pos..];
    let word_start = rest.len() - rest.trim_start().len();
    let word_len = rest[word_start..].find(char::is_whitespace).unwrap_or(rest.len() - word_start);
    word_start + word_len
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Longest prefix of `b` that is also a suffix of `a`, in chars.
fn shared_boundary(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    (1..=b_chars.len())
        .rev()
        .find(|&k| a.ends_with(&b_chars[..k].iter().collect::<String>()))
        .unwrap_or(0)
}

mod prop_recursive_chunker {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_never_exceed_chunk_size(
            text in arb_text(),
            size in 40usize..200,
            overlap in 0usize..20,
        ) {
            let chunks = RecursiveChunker::new(size, overlap).split_text(&text);
            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                prop_assert!(char_len(chunk) <= size, "{} > {size}: {chunk:?}", char_len(chunk));
            }
        }

        #[test]
        fn consecutive_chunks_share_the_overlap(
            text in arb_text(),
            size in 40usize..200,
            overlap in 0usize..20,
        ) {
            let chunks = RecursiveChunker::new(size, overlap).split_text(&text);
            for pair in chunks.windows(2) {
                prop_assert!(
                    shared_boundary(&pair[0], &pair[1]) >= overlap,
                    "overlap below {overlap}: {pair:?}"
                );
            }
        }

        #[test]
        fn chunks_cover_the_text_in_order(
            text in arb_text(),
            size in 40usize..200,
            overlap in 0usize..20,
        ) {
            let chunks = RecursiveChunker::new(size, overlap).split_text(&text);
            let mut search_from = 0;
            for chunk in &chunks {
                prop_assert!(text.contains(chunk.as_str()));
                let found = text[search_from..].find(chunk.as_str());
                prop_assert!(found.is_some(), "chunk out of order: {chunk:?}");
                search_from += found.unwrap_or(0);
            }
            if char_len(&text) > size {
                let first_word = text.split_whitespace().next().unwrap_or_default();
                let last_word = text.split_whitespace().last().unwrap_or_default();
                prop_assert!(chunks[0].starts_with(first_word));
                prop_assert!(chunks[chunks.len() - 1].ends_with(last_word));
            }
        }

        #[test]
        fn wide_cases_keep_size_overlap_and_coverage((text, size, overlap) in arb_wide_case()) {
            let chunker = RecursiveChunker::new(size, overlap);
            let ranges = chunker.split_ranges(&text);
            prop_assert!(!ranges.is_empty());

            for range in &ranges {
                let chunk = &text[range.clone()];
                let single_word = !chunk.contains(char::is_whitespace);
                prop_assert!(
                    chunk.len() <= size || single_word,
                    "{} > {size} with several words: {chunk:?}", chunk.len()
                );
            }

            for pair in ranges.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                prop_assert!(prev.start < next.start && prev.end < next.end, "{prev:?} then {next:?}");
                if overlap > 0 && next_token_len(&text, prev.end) <= size - overlap {
                    let shared = prev.end.saturating_sub(next.start);
                    prop_assert!(shared >= overlap, "shared {shared} < {overlap}: {prev:?} then {next:?}");
                }
            }

            for (i, c) in text.char_indices() {
                if !c.is_whitespace() {
                    prop_assert!(ranges.iter().any(|r| r.contains(&i)), "byte {i} not covered");
                }
            }

            let first_word = text.split_whitespace().next().unwrap_or_default();
            let last_word = text.split_whitespace().last().unwrap_or_default();
            prop_assert!(text[ranges[0].clone()].starts_with(first_word));
            prop_assert!(text[ranges[ranges.len() - 1].clone()].ends_with(last_word));
        }

        #[test]
        fn short_text_is_returned_verbatim(text in "[a-z][a-z \n]{0,39}") {
            prop_assert_eq!(RecursiveChunker::new(40, 5).split_text(&text), vec![text.clone()]);
        }

        #[test]
        fn fixed_size_windows_reassemble_the_text(
            text in "[a-zé][a-zé ]{0,299}",
            size in 1usize..50,
        ) {
            let chunks = FixedSizeChunker::new(size, 0).split_text(&text);
            prop_assert_eq!(chunks.concat(), text);
        }
    }
}

#[test]
fn whitespace_only_text_has_no_chunks() {
    let text = " \n ".repeat(40);
    assert!(RecursiveChunker::new(20, 5).split_text(&text).is_empty());
}
