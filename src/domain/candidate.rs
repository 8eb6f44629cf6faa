use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::{Element, ElementId, Page};

/// Class names of the result tiles used by image search galleries.
pub const GALLERY_CONTAINER_CLASSES: [&str; 2] = ["isv-r", "eA0Zlc"];

static SRCSET_FIRST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^\s,]+)").expect("valid srcset regex"));

/// An image element together with the URL it would be classified under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub element: ElementId,
    pub url: String,
}

impl ImageCandidate {
    /// Derives the candidate for `element`; `None` when the element is gone,
    /// is not an image, or only carries an inline `data:` source.
    pub fn resolve(page: &Page, element: ElementId) -> Option<Self> {
        let url = canonical_url(page, element)?;
        Some(Self { element, url })
    }
}

pub fn is_gallery_container(element: &Element) -> bool {
    element.tag == "div"
        && GALLERY_CONTAINER_CLASSES
            .iter()
            .any(|class| element.has_class(class))
}

/// Nearest gallery tile, else the immediate parent, else the image itself.
/// The body is never a container: hiding it would hide the whole page.
pub fn container_for(page: &Page, img: ElementId) -> ElementId {
    page.closest(img, is_gallery_container)
        .or_else(|| {
            page.get(img)
                .and_then(|element| element.parent())
                .filter(|parent| *parent != page.body())
        })
        .unwrap_or(img)
}

pub fn canonical_url(page: &Page, img: ElementId) -> Option<String> {
    let element = page.get(img).filter(|element| element.is_image())?;
    let container = container_for(page, img);

    let raw = [
        page.attribute(container, "data-iurl").map(str::to_string),
        page.attribute(container, "data-src").map(str::to_string),
        element.current_src.clone(),
        element.attribute("srcset").and_then(first_srcset_entry),
        element.attribute("src").map(str::to_string),
        element.attribute("data-src").map(str::to_string),
        element.attribute("data-srcset").and_then(first_srcset_entry),
    ]
    .into_iter()
    .flatten()
    .find(|value| !value.trim().is_empty())?;

    if raw.trim_start().starts_with("data:") {
        return None;
    }
    page.resolve_url(&raw)
}

pub fn first_srcset_entry(srcset: &str) -> Option<String> {
    SRCSET_FIRST
        .captures(srcset)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn page_with_image(attrs: &[(&str, &str)]) -> (Page, ElementId, ElementId) {
        let mut page = Page::new(Url::parse("https://example.com/").unwrap(), 800.0);
        let body = page.body();
        let wrapper = page.create_element("div");
        let img = page.create_element("img");
        page.append_child(body, wrapper).unwrap();
        page.append_child(wrapper, img).unwrap();
        for (name, value) in attrs {
            page.set_attribute(img, name, *value);
        }
        (page, wrapper, img)
    }

    #[test]
    fn container_override_wins_over_image_sources() {
        let (mut page, wrapper, img) = page_with_image(&[("src", "/thumb.jpg")]);
        page.add_class(wrapper, "isv-r");
        page.set_attribute(wrapper, "data-iurl", "https://cdn.example.com/full.jpg");

        assert_eq!(
            canonical_url(&page, img).as_deref(),
            Some("https://cdn.example.com/full.jpg")
        );
    }

    #[test]
    fn current_src_then_srcset_then_src() {
        let (mut page, _, img) =
            page_with_image(&[("srcset", "a-1x.jpg 1x, a-2x.jpg 2x"), ("src", "plain.jpg")]);
        assert_eq!(
            canonical_url(&page, img).as_deref(),
            Some("https://example.com/a-1x.jpg")
        );

        page.get_mut(img).unwrap().current_src = Some("https://example.com/rendered.jpg".into());
        assert_eq!(
            canonical_url(&page, img).as_deref(),
            Some("https://example.com/rendered.jpg")
        );
    }

    #[test]
    fn lazy_loading_attributes_are_used_last() {
        let (page, _, img) = page_with_image(&[("data-srcset", "lazy.jpg 300w")]);
        assert_eq!(
            canonical_url(&page, img).as_deref(),
            Some("https://example.com/lazy.jpg")
        );
    }

    #[test]
    fn data_urls_are_never_candidates() {
        let (page, _, img) = page_with_image(&[("src", "data:image/png;base64,AAAA")]);
        assert!(ImageCandidate::resolve(&page, img).is_none());
    }

    #[test]
    fn container_falls_back_to_parent_then_self() {
        let (mut page, wrapper, img) = page_with_image(&[]);
        assert_eq!(container_for(&page, img), wrapper);

        let orphan = page.create_element("img");
        assert_eq!(container_for(&page, orphan), orphan);

        let body = page.body();
        let loose = page.create_element("img");
        page.append_child(body, loose).unwrap();
        assert_eq!(container_for(&page, loose), loose);
    }
}
