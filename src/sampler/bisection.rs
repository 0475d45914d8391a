/*
Copyright 2025 Open Data PVNet contributors

This file is part of PVNet Data Sampler.

PVNet Data Sampler is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

PVNet Data Sampler is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with PVNet Data Sampler. If not, see https://www.gnu.org/licenses/.
*/

//! Module containg methods for conducting
//! binary search (bisection) over sorted time axes.

use crate::errors::SearchError;
use std::ops::Range;

/// Index of the first item not smaller than `x`
/// (`array.len()` when every item is smaller).
///
/// `array` must be sorted ascendingly.
fn lower_bound<T: PartialOrd>(array: &[T], x: &T) -> usize {
    let mut lo = 0;
    let mut hi = array.len();

    while lo < hi {
        let mid = (lo + hi) / 2;

        if array[mid] < *x {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

/// Index of the first item greater than `x`.
fn upper_bound<T: PartialOrd>(array: &[T], x: &T) -> usize {
    let mut lo = 0;
    let mut hi = array.len();

    while lo < hi {
        let mid = (lo + hi) / 2;

        if array[mid] <= *x {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

/// Index of the last item at or before `x`.
///
/// Items after `x` can't be used, so searching below the first item
/// is out of bounds while searching past the last one gives the last.
pub fn find_left_closest<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    if array.is_empty() {
        return Err(SearchError::EmptyArray);
    }

    match upper_bound(array, x) {
        0 => Err(SearchError::OutOfBounds),
        i => Ok(i - 1),
    }
}

/// Range of indices of items within `[start, end]`, ends included.
pub fn find_within<T: PartialOrd>(array: &[T], start: &T, end: &T) -> Range<usize> {
    let first = lower_bound(array, start);
    let last = upper_bound(array, end).max(first);

    first..last
}

#[cfg(test)]
mod tests {
    use super::{find_left_closest, find_within};
    use crate::errors::SearchError;

    #[test]
    fn left_closest_is_found() {
        let array = [0, 6, 12, 18];

        assert_eq!(find_left_closest(&array, &0), Ok(0));
        assert_eq!(find_left_closest(&array, &7), Ok(1));
        assert_eq!(find_left_closest(&array, &12), Ok(2));
        assert_eq!(find_left_closest(&array, &40), Ok(3));
    }

    #[test]
    fn left_closest_errors() {
        let empty: [i32; 0] = [];

        assert_eq!(find_left_closest(&empty, &1), Err(SearchError::EmptyArray));
        assert_eq!(find_left_closest(&[5, 6], &4), Err(SearchError::OutOfBounds));
    }

    #[test]
    fn ranges_include_both_ends() {
        let array = [0, 6, 12, 18, 24];

        assert_eq!(find_within(&array, &6, &18), 1..4);
        assert_eq!(find_within(&array, &5, &13), 1..3);
        assert_eq!(find_within(&array, &-10, &100), 0..5);
        assert!(find_within(&array, &7, &11).is_empty());
        assert!(find_within(&array, &30, &0).is_empty());
    }
}
