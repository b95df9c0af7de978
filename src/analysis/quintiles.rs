use crate::models::aggregate::Quintiles;

/// Split a descending-ranked list into five contiguous groups.
///
/// Groups 1–4 hold `n / 5` items each and group 5 takes the remainder, so
/// fewer than five items leaves the first groups empty.
pub fn partition_into_quintiles<T: Clone>(ranked: &[T]) -> Quintiles<T> {
    let step = ranked.len() / 5;
    let cut = |i: usize| &ranked[i * step..(i + 1) * step];

    Quintiles {
        groups: [
            cut(0).to_vec(),
            cut(1).to_vec(),
            cut(2).to_vec(),
            cut(3).to_vec(),
            ranked[4 * step..].to_vec(),
        ],
    }
}

/// Stable descending sort by value.
pub fn rank_descending<K>(mut items: Vec<(K, f64)>) -> Vec<(K, f64)> {
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
    items
}
