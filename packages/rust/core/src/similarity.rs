//! Sequence similarity based on matching contiguous blocks (Ratcliff/Obershelp).
//!
//! `ratio` is `2*M / T`, where `T` is the total length of both strings and
//! `M` the number of characters in matching blocks. Blocks are found by
//! taking the longest common substring and recursing on both sides of it.
//! Ties go to the block that starts earliest in the first string, then in
//! the second, so rankings are deterministic.

/// Similarity of `a` and `b` in `[0, 1]`. Two empty strings score `1.0`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

/// Up to `n` candidates scoring at least `cutoff` against `word`, best first.
///
/// Equal scores are ordered by the candidate itself, greatest first.
pub fn close_matches<'a, I>(word: &str, candidates: I, n: usize, cutoff: f64) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    if n == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &'a str)> = candidates
        .into_iter()
        .map(|candidate| (ratio(candidate, word), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();

    scored.sort_by(|(sa, ca), (sb, cb)| sb.total_cmp(sa).then_with(|| cb.cmp(ca)));
    scored.truncate(n);
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Total size of all matching blocks between `a` and `b`.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }

    total
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    // run[j - blo] = length of the match ending at (i - 1, j)
    let mut run = vec![0usize; bhi - blo];

    for i in alo..ahi {
        let mut next = vec![0usize; bhi - blo];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = if j > blo { run[j - blo - 1] + 1 } else { 1 };
            next[j - blo] = k;
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        run = next;
    }

    best
}
