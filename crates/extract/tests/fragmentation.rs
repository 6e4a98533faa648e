//! Fragmentation invariance: however a stream is split, the coalesced
//! event sequence is the same as feeding it whole.

use forgeloop_core::{Grammar, StructuralEvent, coalesce};
use forgeloop_extract::{BalancedExtractor, PairedTagExtractor, StreamExtractor};

const ARTIFACT_STREAM: &str = concat!(
    "I'll build it. <boltArtifact id=\"todo-app\" title=\"Todo App\">",
    "{\"type\":\"file\",\"file_path\":\"src/app.js\",\"content\":\"const a = {b: \\\"}\\\"};\"}",
    "{\"type\":\"shell\",\"command\":\"npm install\"}",
    "</boltArtifact> Run it with npm start."
);

const BALANCED_STREAM: &str = concat!(
    "Plan: {not json} then ",
    "{\"type\":\"message\",\"content\":\"héllo {world}\"}",
    " and {\"type\":\"shell\",\"command\":\"ls -la\",\"step_number\":2} end"
);

fn whole(grammar: Grammar, input: &str) -> Vec<StructuralEvent> {
    split_at(grammar, input, &[])
}

fn split_at(grammar: Grammar, input: &str, cuts: &[usize]) -> Vec<StructuralEvent> {
    let mut ex = StreamExtractor::new(grammar);
    let mut events = Vec::new();
    let mut from = 0;
    for &cut in cuts {
        events.extend(ex.feed(&input[from..cut]));
        from = cut;
    }
    events.extend(ex.feed(&input[from..]));
    events.extend(ex.end_of_stream());
    coalesce(events)
}

fn char_boundaries(input: &str) -> Vec<usize> {
    (1..input.len())
        .filter(|&i| input.is_char_boundary(i))
        .collect()
}

#[test]
fn paired_tag_stream_every_single_split() {
    let expected = whole(Grammar::PairedTag, ARTIFACT_STREAM);
    assert_eq!(
        expected
            .iter()
            .filter(|e| matches!(e, StructuralEvent::ActionEmitted { .. }))
            .count(),
        2
    );
    for cut in char_boundaries(ARTIFACT_STREAM) {
        assert_eq!(
            split_at(Grammar::PairedTag, ARTIFACT_STREAM, &[cut]),
            expected,
            "split at byte {cut}"
        );
    }
}

#[test]
fn balanced_stream_every_single_split() {
    let expected = whole(Grammar::Balanced, BALANCED_STREAM);
    assert_eq!(
        expected
            .iter()
            .filter(|e| matches!(e, StructuralEvent::ActionEmitted { .. }))
            .count(),
        2
    );
    for cut in char_boundaries(BALANCED_STREAM) {
        assert_eq!(
            split_at(Grammar::Balanced, BALANCED_STREAM, &[cut]),
            expected,
            "split at byte {cut}"
        );
    }
}

#[test]
fn one_char_fragments_match_whole() {
    for (grammar, input) in [
        (Grammar::PairedTag, ARTIFACT_STREAM),
        (Grammar::Balanced, BALANCED_STREAM),
    ] {
        let cuts = char_boundaries(input);
        assert_eq!(split_at(grammar, input, &cuts), whole(grammar, input));
    }
}

#[test]
fn no_text_is_lost_or_duplicated() {
    let mut ex = PairedTagExtractor::new();
    let mut rebuilt = String::new();
    for chunk in ARTIFACT_STREAM.as_bytes().chunks(7) {
        // ASCII input, so any byte chunk is valid UTF-8
        let text = std::str::from_utf8(chunk).unwrap();
        for event in ex.feed(text) {
            rebuilt.push_str(event.literal());
        }
    }
    for event in ex.finish() {
        rebuilt.push_str(event.literal());
    }
    assert_eq!(rebuilt, ARTIFACT_STREAM);
}

#[test]
fn inner_braces_in_string_never_split_the_object() {
    let input = r#"{"type":"file","content":"a{b}c"}"#;
    for cut in char_boundaries(input) {
        let mut ex = BalancedExtractor::new();
        let mut found = ex.feed(&input[..cut]);
        found.extend(ex.feed(&input[cut..]));
        assert_eq!(found.len(), 1, "split at byte {cut}");
        assert_eq!(found[0].value["content"], "a{b}c");
    }
}

#[test]
fn split_wrapper_close_reassembles() {
    let mut ex = PairedTagExtractor::new();
    let mut events = ex.feed(r#"<boltArtifact id="x" title="Y">hi</bolt"#);
    events.extend(ex.feed("Artifact>"));
    let kinds: Vec<_> = events.iter().map(|e| e.literal().to_string()).collect();
    assert_eq!(
        kinds,
        vec![
            r#"<boltArtifact id="x" title="Y">"#.to_string(),
            "hi".to_string(),
            "</boltArtifact>".to_string(),
        ]
    );
}
