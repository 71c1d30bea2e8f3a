/// Queue shuffle
///
/// Permutes the items at a chosen set of positions among themselves. Pinned
/// items (tracks already loaded into a deck) never move, and positions
/// outside the selection are untouched.
use rand::Rng;

/// Shuffle `items` at `selection` (all positions when empty).
///
/// Out-of-range and duplicate positions are ignored. Returns how many
/// positions took part in the shuffle.
pub fn shuffle_selection<T, R>(
    items: &mut [T],
    selection: &[usize],
    is_pinned: impl Fn(&T) -> bool,
    rng: &mut R,
) -> usize
where
    R: Rng + ?Sized,
{
    let mut positions: Vec<usize> = if selection.is_empty() {
        (0..items.len()).collect()
    } else {
        let mut picked: Vec<usize> =
            selection.iter().copied().filter(|&i| i < items.len()).collect();
        picked.sort_unstable();
        picked.dedup();
        picked
    };
    positions.retain(|&i| !is_pinned(&items[i]));

    // Fisher–Yates over the position list.
    for i in (1..positions.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(positions[i], positions[j]);
    }
    positions.len()
}
