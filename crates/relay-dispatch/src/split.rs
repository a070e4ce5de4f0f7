//! Content splitting for size-limited destinations.
//!
//! Lines are packed greedily into chunks. Only a line that would overflow
//! the current chunk is broken further, at sentence ends, and those
//! sentences are packed the same way. Nothing is ever truncated: a single
//! sentence longer than the limit becomes its own oversized chunk.

/// Split `text` into ordered chunks of at most `limit` characters.
///
/// Concatenating the result gives back `text` exactly. The result always has
/// at least one element; empty input yields one empty chunk.
pub fn split(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        for sentence in sentences(line) {
            let sentence_len = sentence.chars().count();
            if current_len + sentence_len > limit && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push_str(sentence);
            current_len += sentence_len;
        }
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break `line` after every run of `.`, `?` or `!` that is followed by
/// whitespace or ends the line. Trailing whitespace starts the next piece,
/// so the pieces concatenate back to `line`.
fn sentences(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let boundary = match chars.peek() {
            None => true,
            Some(&(_, next)) => next.is_whitespace(),
        };
        if boundary {
            let end = idx + c.len_utf8();
            out.push(&line[start..end]);
            start = end;
        }
    }

    if start < line.len() {
        out.push(&line[start..]);
    }
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}
