//! In-memory page model the pipeline observes and mutates.
//!
//! Elements live in an arena and are addressed by [`ElementId`]. Layout boxes
//! are stored in page coordinates; client rects are derived from the current
//! scroll offset the same way a browser's `getBoundingClientRect` would be.

pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use snapshot::{NodeSpec, PageSnapshot};

pub type SharedPage = Arc<Mutex<Page>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Page-relative layout box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub top: f64,
    pub height: f64,
    #[serde(default)]
    pub width: f64,
}

impl LayoutBox {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Viewport-relative rectangle, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientRect {
    pub top: f64,
    pub bottom: f64,
    pub width: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PageError {
    #[error("element {0} does not exist")]
    UnknownElement(ElementId),
    #[error("element {0} has no parent")]
    Detached(ElementId),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub classes: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
    pub current_src: Option<String>,
    pub layout: LayoutBox,
    pub text: Option<String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            classes: BTreeSet::new(),
            attributes: BTreeMap::new(),
            current_src: None,
            layout: LayoutBox::default(),
            text: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.tag == "img"
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }
}

#[derive(Debug)]
pub struct Page {
    base_url: Url,
    scroll_y: f64,
    viewport_height: f64,
    body: ElementId,
    nodes: Vec<Option<Element>>,
}

impl Page {
    pub fn new(base_url: Url, viewport_height: f64) -> Self {
        let mut body = Element::new("body");
        body.layout.height = viewport_height;
        Self {
            base_url,
            scroll_y: 0.0,
            viewport_height,
            body: ElementId(0),
            nodes: vec![Some(body)],
        }
    }

    pub fn into_shared(self) -> SharedPage {
        Arc::new(Mutex::new(self))
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn scroll_to(&mut self, y: f64) {
        self.scroll_y = y.max(0.0);
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height.max(0.0);
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Some(Element::new(tag)));
        id
    }

    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), PageError> {
        self.ensure(parent)?;
        self.ensure(child)?;
        self.unlink(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
        Ok(())
    }

    /// Inserts `new` directly after `reference` under the same parent.
    pub fn insert_after(&mut self, reference: ElementId, new: ElementId) -> Result<(), PageError> {
        self.ensure(new)?;
        let parent = self
            .get(reference)
            .ok_or(PageError::UnknownElement(reference))?
            .parent
            .ok_or(PageError::Detached(reference))?;
        self.unlink(new);
        let siblings = &mut self.node_mut(parent).children;
        let index = siblings
            .iter()
            .position(|id| *id == reference)
            .map_or(siblings.len(), |pos| pos + 1);
        siblings.insert(index, new);
        self.node_mut(new).parent = Some(parent);
        Ok(())
    }

    /// Inserts `new` directly before `reference` under the same parent.
    pub fn insert_before(&mut self, reference: ElementId, new: ElementId) -> Result<(), PageError> {
        self.ensure(new)?;
        let parent = self
            .get(reference)
            .ok_or(PageError::UnknownElement(reference))?
            .parent
            .ok_or(PageError::Detached(reference))?;
        self.unlink(new);
        let siblings = &mut self.node_mut(parent).children;
        let index = siblings.iter().position(|id| *id == reference).unwrap_or(0);
        siblings.insert(index, new);
        self.node_mut(new).parent = Some(parent);
        Ok(())
    }

    /// Detaches `id` and drops its whole subtree from the arena.
    pub fn remove(&mut self, id: ElementId) -> Result<(), PageError> {
        if id == self.body {
            return Err(PageError::Detached(id));
        }
        self.ensure(id)?;
        self.unlink(id);
        for node in self.subtree(id) {
            if let Some(slot) = self.nodes.get_mut(node.0) {
                *slot = None;
            }
        }
        Ok(())
    }

    pub fn next_sibling(&self, id: ElementId) -> Option<ElementId> {
        let parent = self.get(id)?.parent?;
        let siblings = &self.get(parent)?.children;
        let pos = siblings.iter().position(|child| *child == id)?;
        siblings.get(pos + 1).copied()
    }

    pub fn previous_sibling(&self, id: ElementId) -> Option<ElementId> {
        let parent = self.get(id)?.parent?;
        let siblings = &self.get(parent)?.children;
        let pos = siblings.iter().position(|child| *child == id)?;
        pos.checked_sub(1).and_then(|prev| siblings.get(prev).copied())
    }

    /// Nearest inclusive ancestor satisfying `pred`.
    pub fn closest<F>(&self, id: ElementId, pred: F) -> Option<ElementId>
    where
        F: Fn(&Element) -> bool,
    {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let element = self.get(current)?;
            if pred(element) {
                return Some(current);
            }
            cursor = element.parent;
        }
        None
    }

    /// Pre-order walk of `root` and its descendants.
    pub fn subtree(&self, root: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(element) = self.get(id) else {
                continue;
            };
            out.push(id);
            stack.extend(element.children.iter().rev().copied());
        }
        out
    }

    pub fn query_all<F>(&self, root: ElementId, pred: F) -> Vec<ElementId>
    where
        F: Fn(&Element) -> bool,
    {
        self.subtree(root)
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(&pred))
            .collect()
    }

    pub fn images(&self) -> Vec<ElementId> {
        self.query_all(self.body, Element::is_image)
    }

    /// `root` itself if it is an image, else its first descendant image.
    pub fn first_image(&self, root: ElementId) -> Option<ElementId> {
        self.subtree(root)
            .into_iter()
            .find(|id| self.get(*id).is_some_and(Element::is_image))
    }

    pub fn bounding_client_rect(&self, id: ElementId) -> Option<ClientRect> {
        let layout = self.get(id)?.layout;
        Some(ClientRect {
            top: layout.top - self.scroll_y,
            bottom: layout.bottom() - self.scroll_y,
            width: layout.width,
        })
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.get(id)?.attribute(name)
    }

    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.get_mut(id) {
            element.attributes.insert(name.to_string(), value.into());
        }
    }

    pub fn remove_attribute(&mut self, id: ElementId, name: &str) {
        if let Some(element) = self.get_mut(id) {
            element.attributes.remove(name);
        }
    }

    pub fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.get(id).is_some_and(|element| element.has_class(class))
    }

    pub fn add_class(&mut self, id: ElementId, class: &str) {
        if let Some(element) = self.get_mut(id) {
            element.classes.insert(class.to_string());
        }
    }

    pub fn remove_class(&mut self, id: ElementId, class: &str) {
        if let Some(element) = self.get_mut(id) {
            element.classes.remove(class);
        }
    }

    /// Resolves a raw attribute value against the page URL.
    pub fn resolve_url(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.base_url.join(trimmed).ok().map(String::from)
    }

    fn ensure(&self, id: ElementId) -> Result<(), PageError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(PageError::UnknownElement(id))
        }
    }

    fn node_mut(&mut self, id: ElementId) -> &mut Element {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(element) => element,
            None => unreachable!("element {id} checked before mutation"),
        }
    }

    fn unlink(&mut self, id: ElementId) {
        let Some(parent) = self.get(id).and_then(|element| element.parent) else {
            return;
        };
        if let Some(parent) = self.get_mut(parent) {
            parent.children.retain(|child| *child != id);
        }
        if let Some(element) = self.get_mut(id) {
            element.parent = None;
        }
    }
}
