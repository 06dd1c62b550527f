//! Merging of word bounding boxes into per-line highlight rectangles.

use serde::{Deserialize, Serialize};

/// A bounding box on a source PDF page, as stored in the index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Coordinate {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// One merged highlight rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Merged rectangles for a single page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRects {
    pub page: u32,
    pub coordinates: Vec<Rect>,
}

/// Merges word boxes into one rectangle per visual text line.
///
/// Boxes on the same page sharing a top edge (`y0`) are unioned along x;
/// a new `y0` starts a new rectangle. Pages appear in first-seen order.
pub fn group_coordinates(coordinates: &[Coordinate]) -> Vec<PageRects> {
    let mut pages: Vec<PageRects> = Vec::new();

    for coord in coordinates {
        let idx = match pages.iter().position(|p| p.page == coord.page) {
            Some(idx) => idx,
            None => {
                pages.push(PageRects {
                    page: coord.page,
                    coordinates: Vec::new(),
                });
                pages.len() - 1
            }
        };
        let page = &mut pages[idx];

        match page.coordinates.iter_mut().find(|r| r.y0 == coord.y0) {
            Some(rect) => {
                rect.x0 = rect.x0.min(coord.x0);
                rect.x1 = rect.x1.max(coord.x1);
            }
            None => page.coordinates.push(Rect {
                x0: coord.x0,
                y0: coord.y0,
                x1: coord.x1,
                y1: coord.y1,
            }),
        }
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(page: u32, x0: f64, y0: f64, x1: f64, y1: f64) -> Coordinate {
        Coordinate { page, x0, y0, x1, y1 }
    }

    #[test]
    fn same_line_boxes_are_unioned_along_x() {
        let grouped = group_coordinates(&[
            coord(0, 10.0, 100.0, 20.0, 110.0),
            coord(0, 25.0, 100.0, 40.0, 110.0),
            coord(0, 5.0, 100.0, 8.0, 110.0),
        ]);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].coordinates.len(), 1);
        let rect = &grouped[0].coordinates[0];
        assert_eq!(rect.x0, 5.0);
        assert_eq!(rect.x1, 40.0);
        assert_eq!(rect.y0, 100.0);
    }

    #[test]
    fn distinct_lines_start_new_rectangles() {
        let grouped = group_coordinates(&[
            coord(0, 10.0, 100.0, 20.0, 110.0),
            coord(0, 10.0, 120.0, 20.0, 130.0),
        ]);

        assert_eq!(grouped[0].coordinates.len(), 2);
    }

    #[test]
    fn pages_are_kept_apart() {
        let grouped = group_coordinates(&[
            coord(0, 10.0, 100.0, 20.0, 110.0),
            coord(1, 10.0, 100.0, 20.0, 110.0),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].page, 0);
        assert_eq!(grouped[1].page, 1);
        assert_eq!(grouped[0].coordinates.len(), 1);
        assert_eq!(grouped[1].coordinates.len(), 1);
    }

    #[test]
    fn no_two_rectangles_on_a_page_share_a_top_edge() {
        let coords: Vec<Coordinate> = (0..20)
            .map(|i| coord(i % 3, (i as f64) * 5.0, ((i % 4) as f64) * 12.0, (i as f64) * 5.0 + 4.0, 10.0))
            .collect();

        for page in group_coordinates(&coords) {
            for (i, a) in page.coordinates.iter().enumerate() {
                for b in &page.coordinates[i + 1..] {
                    assert_ne!(a.y0, b.y0, "page {} has two rects on one line", page.page);
                }
            }
        }
    }

    #[test]
    fn empty_input_yields_no_pages() {
        assert!(group_coordinates(&[]).is_empty());
    }
}
