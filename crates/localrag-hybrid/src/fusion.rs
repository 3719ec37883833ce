use std::collections::HashMap;

use localrag_core::types::CandidateResult;

/// Weighted fusion of dense candidates with lexical scores:
/// `alpha * dense + (1 - alpha) * lexical`.
///
/// The lexical score is joined on exact content, so distinct chunks with
/// identical text share one lexical score (the last one seen). Candidates
/// without a lexical hit score 0 on that side. The sort is stable, so ties
/// keep dense order.
pub fn fuse(dense: &[CandidateResult], lexical: &[CandidateResult], alpha: f32, rerank_k: usize) -> Vec<CandidateResult> {
    let lexical_scores: HashMap<&str, f32> = lexical.iter().map(|r| (r.content.as_str(), r.score)).collect();
    let mut merged: Vec<CandidateResult> = dense
        .iter()
        .map(|d| {
            let lex = lexical_scores.get(d.content.as_str()).copied().unwrap_or(0.0);
            CandidateResult { score: alpha * d.score + (1.0 - alpha) * lex, ..d.clone() }
        })
        .collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(rerank_k);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use localrag_core::types::BlockKind;

    fn hit(content: &str, score: f32) -> CandidateResult {
        CandidateResult { heading: "H".into(), content: content.into(), kind: BlockKind::Text, score }
    }

    fn contents(rs: &[CandidateResult]) -> Vec<&str> { rs.iter().map(|r| r.content.as_str()).collect() }

    #[test]
    fn alpha_extremes_follow_one_side() {
        let dense = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let lexical = vec![hit("c", 4.0), hit("b", 2.0)];
        assert_eq!(contents(&fuse(&dense, &lexical, 1.0, 10)), ["a", "b", "c"]);
        assert_eq!(contents(&fuse(&dense, &lexical, 0.0, 10)), ["c", "b", "a"]);
    }

    #[test]
    fn weighted_scores_and_truncation() {
        let dense = vec![hit("a", 1.0), hit("b", 0.5)];
        let lexical = vec![hit("b", 3.0)];
        let fused = fuse(&dense, &lexical, 0.6, 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].content, "b");
        assert!((fused[0].score - (0.6 * 0.5 + 0.4 * 3.0)).abs() < 1e-6);
    }

    #[test]
    fn duplicate_content_shares_the_last_lexical_score() {
        let dense = vec![hit("same", 0.5), hit("same", 0.4)];
        let lexical = vec![hit("same", 1.0), hit("same", 2.0)];
        let fused = fuse(&dense, &lexical, 0.0, 10);
        assert!(fused.iter().all(|r| (r.score - 2.0).abs() < 1e-6));
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse(&[], &[hit("a", 1.0)], 0.6, 10).is_empty());
        assert!(fuse(&[hit("a", 1.0)], &[], 0.6, 0).is_empty());
    }
}
