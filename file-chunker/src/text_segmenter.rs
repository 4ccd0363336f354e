use crate::unified_blocks::UnifiedBlock;

/// Sliding-window chunking (spec §4.3 `chunk_text`): windows of `window_size`
/// characters, each new window starting `overlap` characters before the
/// previous one ended. The exact cut point is nudged backward into the
/// final 20% of the window to land on a sentence end, else a newline, else
/// a space, rather than splitting mid-word.
#[derive(Debug, Clone, Copy)]
pub struct TextChunkParams {
    pub window_size: usize,
    pub overlap: usize,
}

impl Default for TextChunkParams {
    fn default() -> Self {
        Self { window_size: 800, overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockSpan {
    start: usize,
    end: usize,
    page_start: Option<u32>,
    page_end: Option<u32>,
}

fn collect_text_and_spans(blocks: &[UnifiedBlock]) -> (String, Vec<BlockSpan>) {
    let mut text = String::new();
    let mut spans = Vec::with_capacity(blocks.len());
    for b in blocks {
        let t = b.text.replace('\r', "");
        let start = text.len();
        text.push_str(&t);
        spans.push(BlockSpan { start, end: text.len(), page_start: b.page_start, page_end: b.page_end });
        if !t.ends_with('\n') {
            text.push('\n');
        }
    }
    (text, spans)
}

fn page_range_for_segment(start: usize, end: usize, spans: &[BlockSpan]) -> (Option<u32>, Option<u32>) {
    let mut min_p: Option<u32> = None;
    let mut max_p: Option<u32> = None;
    for s in spans {
        if s.end <= start || s.start >= end {
            continue;
        }
        if let Some(ps) = s.page_start {
            min_p = Some(min_p.map_or(ps, |v| v.min(ps)));
        }
        if let Some(pe) = s.page_end {
            max_p = Some(max_p.map_or(pe, |v| v.max(pe)));
        }
    }
    (min_p, max_p)
}

const SENTENCE_ENDS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Finds the rightmost boundary in `[search_from, hard_end)`, preferring a
/// sentence end, then a newline, then a space. Returns the byte offset just
/// after the chosen character, or `None` if the window has no boundary.
fn find_boundary(text: &str, search_from: usize, hard_end: usize) -> Option<usize> {
    let window = &text[search_from..hard_end];

    if let Some((idx, ch)) = window.char_indices().filter(|(_, c)| SENTENCE_ENDS.contains(c)).last() {
        return Some(search_from + idx + ch.len_utf8());
    }
    if let Some(idx) = window.rfind('\n') {
        return Some(search_from + idx + 1);
    }
    if let Some(idx) = window.rfind(' ') {
        return Some(search_from + idx + 1);
    }
    None
}

/// Splits `blocks`' concatenated text into overlapping windows.
pub fn chunk_blocks_to_segments(blocks: &[UnifiedBlock], params: &TextChunkParams) -> Vec<(String, Option<u32>, Option<u32>)> {
    let (text, spans) = collect_text_and_spans(blocks);
    let total = text.len();
    if text.trim().is_empty() {
        return vec![(String::new(), None, None)];
    }

    let window = params.window_size.max(1);
    let overlap = params.overlap.min(window.saturating_sub(1));

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < total {
        let hard_end = (start + window).min(total);
        let mut end = hard_end;
        if hard_end < total {
            let search_from = (start + (window as f64 * 0.8) as usize).clamp(start, hard_end);
            if let Some(cut) = find_boundary(&text, search_from, hard_end) {
                end = cut;
            }
        }
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end <= start {
            end = hard_end;
            while end < total && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        let seg = text[start..end].trim_end_matches('\n');
        if !seg.trim().is_empty() {
            let (ps, pe) = page_range_for_segment(start, end, &spans);
            out.push((seg.to_string(), ps, pe));
        }

        if end >= total {
            break;
        }
        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    if out.is_empty() {
        out.push((String::new(), None, None));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified_blocks::{BlockKind, UnifiedBlock};

    fn block(text: &str) -> UnifiedBlock {
        UnifiedBlock::new(BlockKind::Paragraph, text, 0, "t.txt", "test")
    }

    #[test]
    fn windows_overlap_by_the_configured_amount() {
        let text: String = (0..2000).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let params = TextChunkParams { window_size: 800, overlap: 200 };
        let segs = chunk_blocks_to_segments(&[block(&text)], &params);
        assert!(segs.len() >= 2);
        // the second segment must start with a suffix of the first (overlap region)
        let tail_of_first = &segs[0].0[segs[0].0.len().saturating_sub(50)..];
        assert!(segs[1].0.contains(&tail_of_first[..20]));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let segs = chunk_blocks_to_segments(&[block("hello world")], &TextChunkParams::default());
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].0, "hello world");
    }

    #[test]
    fn prefers_sentence_boundary_in_final_20_percent_of_window() {
        let params = TextChunkParams { window_size: 100, overlap: 20 };
        let mut text = "x".repeat(85);
        text.push_str(". "); // sentence end lands inside the last-20% search window
        text.push_str(&"y".repeat(50));
        let segs = chunk_blocks_to_segments(&[block(&text)], &params);
        assert!(segs[0].0.ends_with('.'));
    }
}
