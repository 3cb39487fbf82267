//! Adaptive token budgeter: converts a model context window into a per-batch
//! character cap and packs items greedily under it.

/// Fraction of CJK characters in the text.
pub fn cjk_ratio(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let total = text.chars().count();
    let cjk = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    cjk as f64 / total.max(1) as f64
}

/// Compute the per-batch character cap from the model window and a sample of
/// the corpus.
///
/// Token budget = max(model_max_tokens * input_ratio - prompt_tokens
/// - output_tokens, 8000); chars/token = 1.0 for CJK-heavy corpora
/// (ratio >= 0.2 over a <=20-item sample) else 3.2; the result is scaled by
/// a 0.95 safety factor, capped at 38000 and floored at 4000.
pub fn calc_batch_char_cap(
    sample_parts: &[String],
    model_max_tokens: u64,
    input_ratio: f64,
    prompt_tokens: u64,
    output_tokens: u64,
) -> usize {
    let sample: String = sample_parts
        .iter()
        .take(20)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let chars_per_token = if cjk_ratio(&sample) >= 0.2 { 1.0 } else { 3.2 };

    let budget = (model_max_tokens as f64 * input_ratio) as i64
        - prompt_tokens as i64
        - output_tokens as i64;
    let budget = budget.max(8000) as f64;

    let cap = (budget * chars_per_token * 0.95) as usize;
    cap.min(38000).max(4000)
}

pub fn default_char_cap(sample_parts: &[String], model_max_tokens: u64, input_ratio: f64) -> usize {
    calc_batch_char_cap(sample_parts, model_max_tokens, input_ratio, 1200, 1500)
}

/// Greedy packing: items are concatenated in order, separated by a blank
/// line, until the next item would overflow `max_chars`. An item longer than
/// the cap forms its own batch; the cap is a packing limit, not truncation.
pub fn batch_strings_by_chars(parts: &[String], max_chars: usize) -> Vec<String> {
    let mut batches: Vec<String> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut cur = 0usize;
    for p in parts {
        let p_len = p.chars().count();
        if buf.is_empty() {
            buf.push(p);
            cur = p_len;
            continue;
        }
        if cur + 2 + p_len <= max_chars {
            buf.push(p);
            cur += 2 + p_len;
        } else {
            batches.push(buf.join("\n\n"));
            buf = vec![p];
            cur = p_len;
        }
    }
    if !buf.is_empty() {
        batches.push(buf.join("\n\n"));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cjk_ratio_detects_chinese() {
        assert!(cjk_ratio("公司发布年度业绩公告") > 0.9);
        assert!(cjk_ratio("pure ascii text only") < 0.01);
        assert_eq!(cjk_ratio(""), 0.0);
    }

    #[test]
    fn cap_never_exceeds_hard_limit() {
        let cjk_sample = vec!["公司公告业绩增长超预期".to_string()];
        for m in [16_000u64, 65_000, 128_000, 1_000_000] {
            for ratio in [0.4, 0.55, 0.6, 0.65, 0.9] {
                let cap = default_char_cap(&cjk_sample, m, ratio);
                assert!(cap <= 38000, "cap {cap} for M={m} r={ratio}");
                assert!(cap >= 4000);
            }
        }
    }

    #[test]
    fn cap_uses_ascii_chars_per_token() {
        let ascii = vec!["plain english corpus".to_string()];
        let cjk = vec!["中文语料中文语料中文语料".to_string()];
        // Same window: the ascii corpus gets the larger 3.2 chars/token.
        let ascii_cap = default_char_cap(&ascii, 20_000, 0.6);
        let cjk_cap = default_char_cap(&cjk, 20_000, 0.6);
        assert!(ascii_cap > cjk_cap);
    }

    #[test]
    fn small_window_floors_at_min_token_budget() {
        // 16k * 0.55 - 2700 ≈ 6100 < 8000 → budget floors at 8000 tokens.
        let cap = default_char_cap(&["中文".to_string()], 16_000, 0.55);
        assert_eq!(cap, 7600); // 8000 * 1.0 * 0.95
    }

    #[test]
    fn batches_respect_cap_and_order() {
        let parts: Vec<String> = (0..10).map(|i| format!("item-{i:02} {}", "x".repeat(30))).collect();
        let batches = batch_strings_by_chars(&parts, 90);
        assert!(batches.len() > 1);
        for b in &batches {
            // Only a single oversize item may exceed the cap.
            if b.contains("\n\n") {
                assert!(b.chars().count() <= 90);
            }
        }
        let joined = batches.join("\n\n");
        for i in 0..10 {
            assert!(joined.contains(&format!("item-{i:02}")));
        }
    }

    #[test]
    fn oversize_item_forms_own_batch() {
        let parts = vec!["short".to_string(), "y".repeat(500), "tail".to_string()];
        let batches = batch_strings_by_chars(&parts, 100);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].chars().count(), 500);
    }
}
