//! Reciprocal rank fusion of the lexical and vector channels.
//!
//! Fusion consumes only ranks, never raw scores, so BM25 and vector
//! similarity need no score normalization to be combined.

/// Rank constant dampening the gap between neighboring ranks
pub const RRF_K: f32 = 60.0;

/// One candidate from a retrieval channel, in rank order
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub id: u64,
    pub path: String,
    pub start_line: u32,
}

/// Which channels ranked a fused candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Both,
    LexicalOnly,
    VectorOnly,
}

impl MatchSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchSource::Both => "hybrid",
            MatchSource::LexicalOnly => "keyword",
            MatchSource::VectorOnly => "semantic",
        }
    }
}

/// A candidate after fusion, ordered best-first
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub id: u64,
    pub path: String,
    pub start_line: u32,
    pub score: f32,
    pub source: MatchSource,
}

/// Fuse two ranked lists with reciprocal rank fusion.
///
/// Each candidate scores the sum of 1/(k + rank) over the lists that contain
/// it, with ranks starting at 1. A candidate present in both lists therefore
/// outranks one at the same positions in a single list. Equal scores are
/// ordered by file path, then start line, so results are deterministic for
/// identical index contents.
pub fn reciprocal_rank_fusion(
    lexical: &[RankedCandidate],
    vector: &[RankedCandidate],
    limit: usize,
) -> Vec<FusedHit> {
    let mut fused: Vec<FusedHit> = Vec::new();
    let mut index_of: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();

    let mut accumulate = |candidates: &[RankedCandidate], from_vector: bool| {
        for (position, candidate) in candidates.iter().enumerate() {
            let rank = (position + 1) as f32;
            let contribution = 1.0 / (RRF_K + rank);

            match index_of.get(&candidate.id) {
                Some(&i) => {
                    fused[i].score += contribution;
                    fused[i].source = MatchSource::Both;
                }
                None => {
                    index_of.insert(candidate.id, fused.len());
                    fused.push(FusedHit {
                        id: candidate.id,
                        path: candidate.path.clone(),
                        start_line: candidate.start_line,
                        score: contribution,
                        source: if from_vector {
                            MatchSource::VectorOnly
                        } else {
                            MatchSource::LexicalOnly
                        },
                    });
                }
            }
        }
    };

    accumulate(lexical, false);
    accumulate(vector, true);

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
    fused.truncate(limit);
    fused
}
