mod leaderboard;
mod similarity;

pub use leaderboard::{aggregate, DESCRIPTION_AMPLIFICATION};
pub use similarity::{number_proximity, text_similarity};
