use serde::Serialize;

use crate::{
    domain::{candidate::canonical_url, ClassificationResult, Mode},
    page::{ElementId, Page},
    pipeline::{
        presentation::{self, PROB_ATTR},
        WorkingArea,
    },
    tasks::QueueSnapshot,
};

/// Final state of the page as printed on stdout.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub url: String,
    pub mode: Mode,
    pub scroll_y: f64,
    pub working_area: WorkingArea,
    pub queue: QueueSnapshot,
    pub cached: usize,
    pub images: Vec<ImageReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub element: ElementId,
    pub url: Option<String>,
    /// Probability recorded for the image's URL, when one is cached.
    pub prob: Option<f64>,
    /// Rounded percentage currently shown on the element.
    pub percent: Option<u32>,
    pub badge: bool,
    pub tooltip: Option<String>,
    pub suppressed: bool,
}

impl PageReport {
    pub fn collect(
        page: &Page,
        mode: Mode,
        working_area: WorkingArea,
        queue: QueueSnapshot,
        cached: usize,
        lookup: impl Fn(&str) -> Option<ClassificationResult>,
    ) -> Self {
        let images = page
            .images()
            .into_iter()
            .map(|img| {
                let url = canonical_url(page, img);
                ImageReport {
                    element: img,
                    prob: url.as_deref().and_then(&lookup).map(|result| result.confidence),
                    url,
                    percent: page.attribute(img, PROB_ATTR).and_then(|raw| raw.parse().ok()),
                    badge: presentation::badge_of(page, img).is_some(),
                    tooltip: page.attribute(img, "title").map(str::to_string),
                    suppressed: presentation::is_suppressed(page, img),
                }
            })
            .collect();

        Self {
            url: page.base_url().to_string(),
            mode,
            scroll_y: page.scroll_y(),
            working_area,
            queue,
            cached,
            images,
        }
    }

    pub fn flagged(&self) -> usize {
        self.images
            .iter()
            .filter(|image| image.badge || image.suppressed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn report_reflects_presentation_state() {
        let mut page = Page::new(Url::parse("https://example.com/").unwrap(), 600.0);
        let body = page.body();
        let flagged = page.create_element("img");
        let plain = page.create_element("img");
        page.append_child(body, flagged).unwrap();
        page.append_child(body, plain).unwrap();
        page.set_attribute(flagged, "src", "/ai.png");
        page.set_attribute(plain, "data-src", "/photo.png");
        presentation::apply(
            &mut page,
            flagged,
            ClassificationResult::from_probability(0.926),
            Mode::Light,
        );

        let report = PageReport::collect(
            &page,
            Mode::Light,
            WorkingArea::default(),
            QueueSnapshot::default(),
            1,
            |url| {
                (url == "https://example.com/ai.png")
                    .then(|| ClassificationResult::from_probability(0.926))
            },
        );
        assert_eq!(report.images.len(), 2);
        assert_eq!(report.flagged(), 1);
        assert_eq!(
            report.images[0],
            ImageReport {
                element: flagged,
                url: Some("https://example.com/ai.png".into()),
                prob: Some(0.926),
                percent: Some(93),
                badge: true,
                tooltip: Some("AI Detected (93%)".into()),
                suppressed: false,
            }
        );
        assert_eq!(report.images[1].prob, None);
        assert_eq!(report.images[1].percent, None);
        assert_eq!(
            report.images[1].url.as_deref(),
            Some("https://example.com/photo.png")
        );
    }
}
