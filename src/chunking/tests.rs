use super::*;

fn paragraph(word: &str, words: usize) -> String {
    std::iter::repeat_n(word, words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn small_text_is_single_chunk() {
    let text = "Paragraph A.\n\nParagraph B.";
    let chunks = chunk_text(text, 500, 50);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Paragraph A.\n\nParagraph B.");
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].start_pos, 0);
    assert_eq!(chunks[0].end_pos, chunks[0].text.len());
}

#[test]
fn long_text_splits_on_paragraph_boundaries() {
    // Each paragraph is ~600 chars; the clamped minimum budget is
    // 300 tokens * 4 chars = 1200 chars, so two paragraphs fit.
    let paragraphs: Vec<String> = (0..6).map(|i| paragraph(&format!("word{i}"), 100)).collect();
    let text = paragraphs.join("\n\n");
    let chunks = chunk_text(&text, 300, 0);

    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        // No overlap configured, so every chunk respects the budget.
        assert!(chunk.text.len() <= 300 * CHARS_PER_TOKEN);
    }
}

#[test]
fn paragraph_sequence_is_preserved() {
    let paragraphs: Vec<String> = (0..8).map(|i| format!("marker{i} {}", paragraph("x", 80))).collect();
    let text = paragraphs.join("\n\n");
    let chunks = chunk_text(&text, 300, 0);

    // With zero overlap, concatenating chunks reconstructs the paragraph
    // sequence exactly.
    let rejoined = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    assert_eq!(rejoined, text);
}

#[test]
fn chunking_is_deterministic() {
    let text = (0..10)
        .map(|i| paragraph(&format!("w{i}"), 120))
        .collect::<Vec<_>>()
        .join("\n\n");

    let first = chunk_text(&text, 450, 50);
    let second = chunk_text(&text, 450, 50);
    assert_eq!(first, second);
}

#[test]
fn target_size_is_clamped_low() {
    let text = (0..6)
        .map(|i| paragraph(&format!("w{i}"), 100))
        .collect::<Vec<_>>()
        .join("\n\n");

    assert_eq!(chunk_text(&text, 100, 20), chunk_text(&text, 300, 20));
    assert_eq!(chunk_text(&text, 0, 20), chunk_text(&text, 300, 20));
}

#[test]
fn target_size_is_clamped_high() {
    let text = (0..10)
        .map(|i| paragraph(&format!("w{i}"), 150))
        .collect::<Vec<_>>()
        .join("\n\n");

    assert_eq!(chunk_text(&text, 2000, 20), chunk_text(&text, 800, 20));
}

#[test]
fn oversized_paragraph_emitted_whole() {
    // One paragraph far beyond the 800-token ceiling must not be split.
    let huge = paragraph("word", 2000);
    let text = format!("Intro paragraph.\n\n{huge}\n\nOutro paragraph.");
    let chunks = chunk_text(&text, 500, 0);

    assert!(
        chunks.iter().any(|c| c.text.contains(&huge)),
        "oversized paragraph should survive intact in a single chunk"
    );
}

#[test]
fn overlap_is_carried_into_next_chunk() {
    let paragraphs: Vec<String> = (0..6).map(|i| paragraph(&format!("word{i}"), 100)).collect();
    let text = paragraphs.join("\n\n");
    let chunks = chunk_text(&text, 300, 50);

    assert!(chunks.len() > 1);
    let overlap_chars = 50 * CHARS_PER_TOKEN;
    for pair in chunks.windows(2) {
        let tail: String = {
            let prev = &pair[0].text;
            let count = prev.chars().count();
            prev.chars().skip(count.saturating_sub(overlap_chars)).collect()
        };
        // The next chunk starts with the previous chunk's tail (modulo
        // the trim applied when the chunk was closed).
        assert!(
            pair[1].text.starts_with(tail.trim()),
            "expected chunk to begin with overlap from its predecessor"
        );
    }
}

#[test]
fn blank_and_whitespace_lines_separate_paragraphs() {
    let text = "First paragraph.\n   \nSecond paragraph.\n\n\nThird paragraph.";
    let chunks = chunk_text(text, 500, 0);

    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].text,
        "First paragraph.\n\nSecond paragraph.\n\nThird paragraph."
    );
}

#[test]
fn empty_input_yields_no_chunks() {
    assert!(chunk_text("", 500, 50).is_empty());
    assert!(chunk_text("   \n\n  \n", 500, 50).is_empty());
}

#[test]
fn offsets_are_internally_consistent() {
    let text = (0..8)
        .map(|i| paragraph(&format!("w{i}"), 110))
        .collect::<Vec<_>>()
        .join("\n\n");
    let chunks = chunk_text(&text, 300, 30);

    let mut prev_start = 0;
    for chunk in &chunks {
        assert_eq!(chunk.end_pos, chunk.start_pos + chunk.text.len());
        assert!(chunk.start_pos >= prev_start || chunk.chunk_index == 0);
        prev_start = chunk.start_pos;
    }
}

#[test]
fn first_chunk_offsets_are_exact() {
    let lead = "Leading paragraph that fills the first chunk. ".repeat(30);
    let text = format!("{}\n\n{}", lead.trim(), paragraph("tail", 200));
    let chunks = chunk_text(&text, 300, 10);

    assert!(chunks.len() > 1);
    assert_eq!(chunks[0].start_pos, 0);
    assert_eq!(chunks[0].end_pos, chunks[0].text.len());
}
