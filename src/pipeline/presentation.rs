//! Page mutations for classified images: badge in light mode, suppression in
//! strict mode, nothing when off.

use crate::{
    domain::{candidate::container_for, ClassificationResult, Mode},
    page::{ElementId, Page},
};

pub const MARK_CLASS: &str = "ai-overlay";
pub const OVERLAY_CLASS: &str = "ai-grey-overlay";
pub const HIDE_CLASS: &str = "ai-hidden";
pub const PLACEHOLDER_CLASS: &str = "ai-hidden-placeholder";

pub const PROB_ATTR: &str = "data-ai-prob";
pub const PROCESSED_ATTR: &str = "data-ai-processed";

const BADGE_REFERENCE_WIDTH: f64 = 250.0;
const BADGE_FONT_PX: f64 = 12.0;

pub fn badge_scale(rendered_width: f64) -> f64 {
    (rendered_width / BADGE_REFERENCE_WIDTH).max(1.0)
}

pub fn tooltip(result: &ClassificationResult) -> String {
    format!("AI Detected ({}%)", result.percent())
}

/// Brings `img` into the state `mode` prescribes for `result`. Applying the
/// same pair twice leaves the page unchanged.
pub fn apply(page: &mut Page, img: ElementId, result: ClassificationResult, mode: Mode) {
    if !page.contains(img) {
        return;
    }

    match mode {
        Mode::Off => {
            strip(page, img);
            return;
        }
        Mode::Light => {
            if result.is_ai {
                attach_badge(page, img, &result);
            } else {
                detach_badge(page, img);
            }
            unsuppress(page, img);
        }
        Mode::Strict => {
            detach_badge(page, img);
            if result.is_ai {
                suppress(page, img);
            } else {
                unsuppress(page, img);
            }
        }
    }

    page.set_attribute(img, PROB_ATTR, result.percent().to_string());
    page.set_attribute(img, PROCESSED_ATTR, "true");
    tracing::debug!(
        target: "presentation",
        element = %img,
        mode = %mode,
        is_ai = result.is_ai,
        "presentation applied"
    );
}

/// Removes every mutation this module may have made to `img`.
pub fn strip(page: &mut Page, img: ElementId) {
    detach_badge(page, img);
    unsuppress(page, img);
    page.remove_attribute(img, PROB_ATTR);
    page.remove_attribute(img, PROCESSED_ATTR);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    pub badges: usize,
    pub suppressed: usize,
    pub images: usize,
}

/// Reverts every mutation on the page.
pub fn clear_all(page: &mut Page) -> ClearSummary {
    let body = page.body();
    let mut summary = ClearSummary::default();

    for generated in page.query_all(body, |element| {
        element.has_class(OVERLAY_CLASS) || element.has_class(PLACEHOLDER_CLASS)
    }) {
        if page.has_class(generated, OVERLAY_CLASS) {
            summary.badges += 1;
        }
        let _ = page.remove(generated);
    }

    for marked in page.query_all(body, |element| element.has_class(MARK_CLASS)) {
        page.remove_class(marked, MARK_CLASS);
        page.remove_attribute(marked, "title");
    }

    for hidden in page.query_all(body, |element| element.has_class(HIDE_CLASS)) {
        page.remove_class(hidden, HIDE_CLASS);
        summary.suppressed += 1;
    }

    for img in page.query_all(body, |element| element.attribute(PROCESSED_ATTR).is_some()) {
        page.remove_attribute(img, PROB_ATTR);
        page.remove_attribute(img, PROCESSED_ATTR);
        summary.images += 1;
    }

    tracing::info!(
        target: "presentation",
        badges = summary.badges,
        suppressed = summary.suppressed,
        images = summary.images,
        "cleared page mutations"
    );
    summary
}

pub fn badge_of(page: &Page, img: ElementId) -> Option<ElementId> {
    page.next_sibling(img)
        .filter(|sibling| page.has_class(*sibling, OVERLAY_CLASS))
}

pub fn is_suppressed(page: &Page, img: ElementId) -> bool {
    page.has_class(container_for(page, img), HIDE_CLASS)
}

fn attach_badge(page: &mut Page, img: ElementId, result: &ClassificationResult) {
    let width = page
        .bounding_client_rect(img)
        .map(|rect| rect.width)
        .unwrap_or_default();
    let scale = badge_scale(width);
    let style = format!(
        "pointer-events: none; font-size: {:.0}px; --ai-badge-scale: {:.2}",
        BADGE_FONT_PX * scale,
        scale
    );

    page.add_class(img, MARK_CLASS);
    page.set_attribute(img, "title", tooltip(result));

    let badge = match badge_of(page, img) {
        Some(existing) => existing,
        None => {
            let badge = page.create_element("div");
            if let Err(err) = page.insert_after(img, badge) {
                tracing::debug!(target: "presentation", element = %img, error = %err, "badge not attached");
                let _ = page.remove(badge);
                return;
            }
            page.add_class(badge, OVERLAY_CLASS);
            page.set_attribute(badge, "aria-hidden", "true");
            badge
        }
    };

    let layout = page.get(img).map(|element| element.layout);
    if let Some(element) = page.get_mut(badge) {
        element.text = Some("AI".to_string());
        if let Some(layout) = layout {
            element.layout = layout;
        }
    }
    page.set_attribute(badge, "style", style);
}

fn detach_badge(page: &mut Page, img: ElementId) {
    if let Some(badge) = badge_of(page, img) {
        let _ = page.remove(badge);
    }
    if page.has_class(img, MARK_CLASS) {
        page.remove_class(img, MARK_CLASS);
        page.remove_attribute(img, "title");
    }
}

fn suppress(page: &mut Page, img: ElementId) {
    let container = container_for(page, img);
    page.add_class(container, HIDE_CLASS);

    let has_placeholder = page
        .previous_sibling(container)
        .is_some_and(|sibling| page.has_class(sibling, PLACEHOLDER_CLASS));
    if has_placeholder {
        return;
    }
    let placeholder = page.create_element("div");
    if page.insert_before(container, placeholder).is_err() {
        let _ = page.remove(placeholder);
        return;
    }
    page.add_class(placeholder, PLACEHOLDER_CLASS);
    if let Some(element) = page.get_mut(placeholder) {
        element.text = Some("AI-generated image hidden".to_string());
    }
}

fn unsuppress(page: &mut Page, img: ElementId) {
    let container = container_for(page, img);
    page.remove_class(container, HIDE_CLASS);
    if let Some(placeholder) = page
        .previous_sibling(container)
        .filter(|sibling| page.has_class(*sibling, PLACEHOLDER_CLASS))
    {
        let _ = page.remove(placeholder);
    }
}
