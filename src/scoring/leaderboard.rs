//! Weighted per-field scoring and leaderboard ranking.

use super::{number_proximity, text_similarity};
use crate::types::{PeerId, PlayerInput, Question, ScoreEntry};

const TITLE_WEIGHT: f64 = 0.40;
const DESCRIPTION_WEIGHT: f64 = 0.40;
const NUMBER_WEIGHT: f64 = 0.20;

/// Description similarity trends low because longer texts dilute the TF-IDF
/// vectors, so it is amplified before the 0.40 weighting is applied. The
/// effective weight on raw description similarity is 1.2, not 0.40.
pub const DESCRIPTION_AMPLIFICATION: f64 = 3.0;

fn score_input(peer_id: &str, input: &PlayerInput, question: &Question) -> ScoreEntry {
    let title_score = text_similarity(&input.text, &question.title);
    let description_score =
        text_similarity(&input.long_text, &question.description) * DESCRIPTION_AMPLIFICATION;
    let number_score = number_proximity(&input.number, question.target_number as f64);

    let total_score = TITLE_WEIGHT * title_score
        + DESCRIPTION_WEIGHT * description_score
        + NUMBER_WEIGHT * number_score;

    ScoreEntry {
        peer_id: peer_id.to_string(),
        title_score,
        description_score,
        number_score,
        total_score,
    }
}

/// Rank every participant (the local player first, then each known peer)
/// against the question's ground truth, descending by total score.
///
/// The sort is stable, so ties keep their encounter order. No side effects:
/// the caller stores the result into the game state.
pub fn aggregate<'a, I>(
    local_id: &str,
    local_input: &PlayerInput,
    others: I,
    question: &Question,
) -> Vec<ScoreEntry>
where
    I: IntoIterator<Item = (&'a PeerId, &'a PlayerInput)>,
{
    let mut entries = vec![score_input(local_id, local_input, question)];
    for (peer_id, input) in others {
        entries.push(score_input(peer_id, input, question));
    }

    entries.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}
