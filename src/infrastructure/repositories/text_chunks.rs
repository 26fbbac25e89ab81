use regex::Regex;
use std::sync::LazyLock;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence pattern"));

/// Split `text` into chunks of at most `max_len` bytes, cutting after
/// sentence-ending punctuation where possible and at char boundaries
/// otherwise. Concatenating the chunks' words gives back the input's words.
pub fn split_at_sentences(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut last_end = 0;

    let sentences = SENTENCE_END
        .find_iter(text)
        .map(|m| m.end())
        .chain(std::iter::once(text.len()));

    for end in sentences {
        if end <= last_end {
            continue;
        }
        let sentence = &text[last_end..end];
        last_end = end;

        if !current.is_empty() && current.len() + sentence.len() > max_len {
            push_trimmed(&mut chunks, &current);
            current.clear();
        }

        if sentence.len() > max_len {
            split_hard(sentence, max_len, &mut chunks);
        } else {
            current.push_str(sentence);
        }
    }

    push_trimmed(&mut chunks, &current);
    chunks
}

fn split_hard(text: &str, max_len: usize, chunks: &mut Vec<String>) {
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // a single char wider than max_len
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        push_trimmed(chunks, &text[start..end]);
        start = end;
    }
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
