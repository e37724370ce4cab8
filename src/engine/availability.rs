use crate::model::*;

/// Merge sorted spans that overlap or touch into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn subtract_no_overlap() {
        let base = [Span::new(9 * H, 12 * H)];
        let remove = [Span::new(13 * H, 14 * H)];
        assert_eq!(subtract_intervals(&base, &remove), base.to_vec());
    }

    #[test]
    fn subtract_full_cover() {
        let base = [Span::new(9 * H, 10 * H)];
        let remove = [Span::new(8 * H, 11 * H)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_edges_and_middle() {
        let base = [Span::new(0, 10 * H)];
        let remove = [
            Span::new(0, H),
            Span::new(3 * H, 4 * H),
            Span::new(9 * H, 10 * H),
        ];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(H, 3 * H), Span::new(4 * H, 9 * H)]
        );
    }

    #[test]
    fn subtract_back_to_back_bookings_leave_no_gap() {
        let base = [Span::new(10 * H, 12 * H)];
        let remove = merge_overlapping(&[Span::new(10 * H, 11 * H), Span::new(11 * H, 12 * H)]);
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_empty_removals() {
        let base = [Span::new(0, H), Span::new(2 * H, 3 * H)];
        assert_eq!(subtract_intervals(&base, &[]), base.to_vec());
    }

    #[test]
    fn merge_overlapping_basic() {
        let spans = [
            Span::new(100, 300),
            Span::new(200, 400),
            Span::new(500, 600),
        ];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }

    #[test]
    fn merge_adjacent() {
        let spans = [Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(100, 300)]);
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }
}
