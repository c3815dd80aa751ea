use serde::{Deserialize, Serialize};

use crate::domain::people::Person;

pub mod cache;

/// Cosine distance below which a candidate is accepted as the same person.
pub const COSINE_THRESHOLD: f32 = 0.40;
/// L2 distance reported alongside a match. Reporting only, never gates.
pub const EUCLIDEAN_THRESHOLD: f32 = 20.0;

/// One known face: the person it belongs to and its stored embedding.
#[derive(Debug, Clone)]
pub struct PersonEmbedding {
    pub person: Person,
    pub embedding: Vec<f32>,
}

/// Distances for a match decision. On no-match, `cosine_distance` carries the
/// minimum distance seen over all candidates (infinity when there were none)
/// so callers can surface "closest but rejected" diagnostics.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct MatchScores {
    pub cosine_distance: f32,
    pub euclidean: f32,
    pub similarity: f32,
}

impl MatchScores {
    fn none() -> Self {
        MatchScores {
            cosine_distance: f32::INFINITY,
            euclidean: f32::INFINITY,
            similarity: -1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub person: Option<Person>,
    pub scores: MatchScores,
}

/// Cosine similarity in [-1, 1]. Defined as 0 when either vector has zero
/// norm (not an error, not NaN).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (va, vb) in a.iter().zip(b.iter()) {
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }
    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cosine distance in [0, 2]. Lower is more similar.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// L2 distance. Lower is more similar.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(va, vb)| (va - vb) * (va - vb))
        .sum::<f32>()
        .sqrt()
}

/// Match `query` against `candidates` with a linear scan.
///
/// A candidate becomes the best match only when its cosine distance is
/// strictly below both `threshold` and the best distance so far, so on an
/// exact tie the first candidate in `candidates` order wins. That order is
/// caller-controlled (store return order), not a stable ranking guarantee.
/// Euclidean distance is computed for the tracked candidate and reported but
/// never gates the decision.
pub fn match_embedding(query: &[f32], candidates: &[PersonEmbedding], threshold: f32) -> FaceMatch {
    let mut best_person: Option<&Person> = None;
    let mut best_scores = MatchScores::none();
    let mut min_seen = MatchScores::none();

    for entry in candidates {
        let cos_d = cosine_distance(query, &entry.embedding);
        if cos_d < min_seen.cosine_distance {
            min_seen = MatchScores {
                cosine_distance: cos_d,
                euclidean: euclidean_distance(query, &entry.embedding),
                similarity: 1.0 - cos_d,
            };
        }
        if cos_d < threshold && cos_d < best_scores.cosine_distance {
            best_scores = MatchScores {
                cosine_distance: cos_d,
                euclidean: euclidean_distance(query, &entry.embedding),
                similarity: 1.0 - cos_d,
            };
            best_person = Some(&entry.person);
        }
    }

    match best_person {
        Some(person) => FaceMatch {
            person: Some(person.clone()),
            scores: best_scores,
        },
        // closest-but-rejected distances, infinity when candidates was empty
        None => FaceMatch {
            person: None,
            scores: min_seen,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> Person {
        Person {
            id: id.to_string(),
            user: "u1".to_string(),
            name: id.to_string(),
            auto_created: false,
            added: None,
            modified: None,
        }
    }

    fn candidate(id: &str, embedding: Vec<f32>) -> PersonEmbedding {
        PersonEmbedding { person: person(id), embedding }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = vec![0.3f32, -1.2, 4.5, 0.001];
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = vec![1.0f32, 2.0, 3.0];
        let b = vec![-0.5f32, 0.7, 1.1];
        assert!((cosine_distance(&a, &b) - cosine_distance(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn zero_norm_vector_has_zero_similarity() {
        let zero = vec![0.0f32; 4];
        let b = vec![1.0f32, 2.0, 3.0, 4.0];
        assert_eq!(cosine_similarity(&zero, &b), 0.0);
        assert_eq!(cosine_similarity(&b, &zero), 0.0);
        assert_eq!(cosine_distance(&zero, &b), 1.0);
    }

    #[test]
    fn empty_candidates_returns_none_with_infinite_distance() {
        let result = match_embedding(&[1.0, 0.0], &[], COSINE_THRESHOLD);
        assert!(result.person.is_none());
        assert_eq!(result.scores.cosine_distance, f32::INFINITY);
    }

    #[test]
    fn never_matches_above_threshold() {
        // orthogonal vectors: cosine distance 1.0
        let result = match_embedding(
            &[1.0, 0.0],
            &[candidate("p1", vec![0.0, 1.0])],
            COSINE_THRESHOLD,
        );
        assert!(result.person.is_none());
        // closest-but-rejected distance is still reported
        assert!((result.scores.cosine_distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn picks_smallest_distance_regardless_of_order() {
        // distance to query [1,0]: far = ~0.29, near = ~0.02
        let near = vec![1.0f32, 0.2];
        let far = vec![1.0f32, 0.8];
        for candidates in [
            vec![candidate("near", near.clone()), candidate("far", far.clone())],
            vec![candidate("far", far.clone()), candidate("near", near.clone())],
        ] {
            let result = match_embedding(&[1.0, 0.0], &candidates, COSINE_THRESHOLD);
            assert_eq!(result.person.unwrap().id, "near");
        }
    }

    #[test]
    fn exact_tie_first_in_order_wins() {
        let emb = vec![1.0f32, 0.1];
        let candidates = vec![candidate("first", emb.clone()), candidate("second", emb)];
        let result = match_embedding(&[1.0, 0.0], &candidates, COSINE_THRESHOLD);
        assert_eq!(result.person.unwrap().id, "first");
    }

    #[test]
    fn euclidean_reported_for_winner() {
        let result = match_embedding(
            &[1.0, 0.0],
            &[candidate("p1", vec![1.0, 0.0])],
            COSINE_THRESHOLD,
        );
        assert!(result.person.is_some());
        assert!(result.scores.euclidean.abs() < 1e-6);
        assert!((result.scores.similarity - 1.0).abs() < 1e-6);
    }
}
