use serde::Serialize;

use crate::page::{ElementId, Page};

/// Vertical band, in page coordinates, within which images are worth classifying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WorkingArea {
    pub top: f64,
    pub bottom: f64,
}

impl WorkingArea {
    /// Inclusive overlap test against a page-relative vertical extent.
    pub fn overlaps(&self, top: f64, bottom: f64) -> bool {
        bottom >= self.top && top <= self.bottom
    }
}

#[derive(Debug, Clone)]
pub struct ViewportTracker {
    margin: f64,
    area: WorkingArea,
}

impl ViewportTracker {
    pub fn new(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
            area: WorkingArea::default(),
        }
    }

    pub fn working_area(&self) -> WorkingArea {
        self.area
    }

    pub fn update_working_area(&mut self, page: &Page) -> WorkingArea {
        let scroll = page.scroll_y();
        self.area = WorkingArea {
            top: (scroll - self.margin).max(0.0),
            bottom: scroll + page.viewport_height() + self.margin,
        };
        tracing::debug!(
            target: "viewport",
            top = self.area.top,
            bottom = self.area.bottom,
            scroll,
            "working area updated"
        );
        self.area
    }

    pub fn is_in_working_area(&self, page: &Page, element: ElementId) -> bool {
        let Some(rect) = page.bounding_client_rect(element) else {
            return false;
        };
        let scroll = page.scroll_y();
        self.area.overlaps(rect.top + scroll, rect.bottom + scroll)
    }

    /// Whether `element` intersects the viewport grown by the margin on every
    /// side, as an intersection observer with a matching root margin reports.
    pub fn intersects_expanded_viewport(&self, page: &Page, element: ElementId) -> bool {
        let Some(rect) = page.bounding_client_rect(element) else {
            return false;
        };
        rect.bottom >= -self.margin && rect.top <= page.viewport_height() + self.margin
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::page::LayoutBox;

    fn page_with(extents: &[(f64, f64)]) -> (Page, Vec<ElementId>) {
        let mut page = Page::new(Url::parse("https://example.com/").unwrap(), 500.0);
        let body = page.body();
        let ids = extents
            .iter()
            .map(|(top, bottom)| {
                let img = page.create_element("img");
                page.append_child(body, img).unwrap();
                page.get_mut(img).unwrap().layout = LayoutBox {
                    top: *top,
                    height: bottom - top,
                    width: 200.0,
                };
                img
            })
            .collect();
        (page, ids)
    }

    #[test]
    fn working_area_spans_viewport_plus_margin() {
        let (mut page, _) = page_with(&[]);
        page.scroll_to(1500.0);
        let mut tracker = ViewportTracker::new(500.0);
        assert_eq!(
            tracker.update_working_area(&page),
            WorkingArea {
                top: 1000.0,
                bottom: 2500.0
            }
        );

        page.scroll_to(100.0);
        assert_eq!(tracker.update_working_area(&page).top, 0.0);
    }

    #[test]
    fn overlap_is_inclusive_on_both_edges() {
        let (mut page, ids) = page_with(&[(1200.0, 1400.0), (50.0, 150.0), (900.0, 1000.0), (2500.0, 2600.0)]);
        page.scroll_to(1500.0);
        let mut tracker = ViewportTracker::new(500.0);
        tracker.update_working_area(&page);

        assert!(tracker.is_in_working_area(&page, ids[0]));
        assert!(!tracker.is_in_working_area(&page, ids[1]));
        assert!(tracker.is_in_working_area(&page, ids[2]));
        assert!(tracker.is_in_working_area(&page, ids[3]));
    }

    #[test]
    fn expanded_viewport_uses_client_coordinates() {
        let (mut page, ids) = page_with(&[(1900.0, 2000.0), (3000.0, 3100.0)]);
        page.scroll_to(1000.0);
        let tracker = ViewportTracker::new(500.0);

        assert!(tracker.intersects_expanded_viewport(&page, ids[0]));
        assert!(!tracker.intersects_expanded_viewport(&page, ids[1]));
    }
}
