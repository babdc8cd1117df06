/// `value` moved from below `reference` to at-or-above it between two bars.
pub fn crosses_above(prev: f64, curr: f64, prev_ref: f64, curr_ref: f64) -> bool {
    prev < prev_ref && curr >= curr_ref
}

/// `value` moved from above `reference` to at-or-below it between two bars.
pub fn crosses_below(prev: f64, curr: f64, prev_ref: f64, curr_ref: f64) -> bool {
    prev > prev_ref && curr <= curr_ref
}

/// True when every value is neither NaN nor infinite.
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Reads index `i` and `i - 1` of every series, or `None` if any is missing or not finite.
pub fn finite_pair(series: &[&[f64]], i: usize) -> Option<Vec<(f64, f64)>> {
    if i == 0 {
        return None;
    }
    series
        .iter()
        .map(|values| {
            let prev = *values.get(i - 1)?;
            let curr = *values.get(i)?;
            (prev.is_finite() && curr.is_finite()).then_some((prev, curr))
        })
        .collect()
}

/// Bars elapsed since `last` is at least `min_bars`. `None` means no signal yet.
pub fn cooldown_elapsed(bar: usize, last: Option<usize>, min_bars: usize) -> bool {
    match last {
        Some(last) => bar.saturating_sub(last) >= min_bars,
        None => true,
    }
}
