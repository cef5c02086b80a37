use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Label-stratified train/validation split over (player id, label) pairs.
/// Each class is shuffled with a seeded RNG and contributes its own
/// proportional share to the validation side, so class balance survives the
/// split and a fixed seed reproduces it exactly.
pub fn stratified_split(
    pairs: &[(String, u8)],
    test_fraction: f64,
    seed: u64,
) -> (Vec<String>, Vec<String>) {
    let fraction = test_fraction.clamp(0.0, 1.0);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [0u8, 1u8] {
        let mut ids: Vec<&String> = pairs
            .iter()
            .filter(|(_, y)| *y == class)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids.shuffle(&mut rng);

        let take = ((ids.len() as f64) * fraction).round() as usize;
        let take = take.min(ids.len());
        for (idx, id) in ids.into_iter().enumerate() {
            if idx < take {
                test.push(id.clone());
            } else {
                train.push(id.clone());
            }
        }
    }

    (train, test)
}
