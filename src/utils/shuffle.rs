use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Seed for one attempt's shuffles, derived from the attempt identity so the
/// same attempt always reconstructs the same order.
pub fn attempt_seed(exam_id: Uuid, student_id: Uuid, attempt_number: i32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(exam_id.as_bytes());
    hasher.update(student_id.as_bytes());
    hasher.update(attempt_number.to_be_bytes());
    hasher.finalize().into()
}

/// Sub-seed for one question's option order within an attempt.
pub fn option_seed(attempt_seed: &[u8; 32], question_id: Uuid) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(attempt_seed);
    hasher.update(question_id.as_bytes());
    hasher.finalize().into()
}

pub fn seeded_shuffle<T>(items: &mut [T], seed: [u8; 32]) {
    let mut rng = StdRng::from_seed(seed);
    items.shuffle(&mut rng);
}
