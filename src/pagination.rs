use std::num::IntErrorKind;

/// A resolved page of a collection with `count` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// 1-based.
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub per_page: u64,
}

impl PageWindow {
    /// Resolves a raw `?page=` value the forgiving way: garbage means the first page,
    /// anything out of range means the last one. Never fails.
    pub fn resolve(raw: Option<&str>, count: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        // An empty collection still has one (empty) page.
        let num_pages = count.div_ceil(per_page).max(1);
        let number = match raw.map(|s| s.trim().parse::<i64>()) {
            None => 1,
            // Integers too wide for i64 are still integers, so they are out of range.
            Some(Err(e)) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                num_pages
            }
            Some(Err(_)) => 1,
            Some(Ok(n)) if n < 1 => num_pages,
            Some(Ok(n)) if n as u64 > num_pages => num_pages,
            Some(Ok(n)) => n as u64,
        };
        Self {
            number,
            num_pages,
            count,
            per_page,
        }
    }

    /// Zero-based index for `Paginator::fetch_page`.
    pub fn index(&self) -> u64 {
        self.number - 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_items_make_two_pages() {
        let first = PageWindow::resolve(Some("1"), 13, 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let second = PageWindow::resolve(Some("2"), 13, 10);
        assert_eq!(second.number, 2);
        assert_eq!(second.index(), 1);
        assert!(!second.has_next());
    }

    #[test]
    fn out_of_range_clamps_to_last_page() {
        for raw in ["7", "0", "-1", "99999999999"] {
            assert_eq!(PageWindow::resolve(Some(raw), 13, 10).number, 2, "page={raw}");
        }
    }

    #[test]
    fn integers_wider_than_i64_clamp_to_last_page() {
        for raw in ["99999999999999999999", "-99999999999999999999", " 18446744073709551616 "] {
            assert_eq!(PageWindow::resolve(Some(raw), 13, 10).number, 2, "page={raw}");
        }
    }

    #[test]
    fn missing_or_garbage_is_first_page() {
        assert_eq!(PageWindow::resolve(None, 13, 10).number, 1);
        assert_eq!(PageWindow::resolve(Some("abc"), 13, 10).number, 1);
        assert_eq!(PageWindow::resolve(Some(""), 13, 10).number, 1);
    }

    #[test]
    fn empty_collection_has_one_page() {
        let window = PageWindow::resolve(Some("3"), 0, 10);
        assert_eq!(window.number, 1);
        assert_eq!(window.num_pages, 1);
        assert!(!window.has_next());
    }
}
