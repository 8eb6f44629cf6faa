use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ElementId, LayoutBox, Page, PageError};

/// Initial page description loaded by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub body: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub current_src: Option<String>,
    #[serde(default)]
    pub rect: Option<LayoutBox>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

fn default_viewport_height() -> f64 {
    900.0
}

impl PageSnapshot {
    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            viewport_height: default_viewport_height(),
            scroll_y: 0.0,
            body: Vec::new(),
        }
    }

    pub async fn load(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read page snapshot {path}"))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("page snapshot {path} is not valid JSON"))?;
        Ok(snapshot)
    }

    pub fn build(&self) -> Result<Page> {
        let base_url = Url::parse(&self.url)
            .with_context(|| format!("page snapshot url {} is invalid", self.url))?;
        let mut page = Page::new(base_url, self.viewport_height);
        page.scroll_to(self.scroll_y);
        let body = page.body();
        for node in &self.body {
            page.build_subtree(body, node)?;
        }
        Ok(page)
    }
}

impl Page {
    /// Materialises `node` under `parent`, returning the new subtree root.
    ///
    /// Children without an explicit layout box inherit their parent's, which
    /// matches how a wrapper and its only image usually share a box.
    pub fn build_subtree(&mut self, parent: ElementId, node: &NodeSpec) -> Result<ElementId, PageError> {
        let inherited = self.get(parent).map(|element| element.layout).unwrap_or_default();
        let id = self.create_element(&node.tag);
        if let Some(element) = self.get_mut(id) {
            element.classes.extend(node.classes.iter().cloned());
            element.attributes = node.attrs.clone();
            element.current_src = node.current_src.clone();
            element.layout = node.rect.unwrap_or(inherited);
            element.text = node.text.clone();
        }
        self.append_child(parent, id)?;
        for child in &node.children {
            self.build_subtree(id, child)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_builds_tree_with_inherited_layout() {
        let snapshot: PageSnapshot = serde_json::from_str(
            r#"{
                "url": "https://images.example.com/search",
                "viewport_height": 1000,
                "scroll_y": 250,
                "body": [{
                    "tag": "div",
                    "classes": ["isv-r"],
                    "attrs": {"data-iurl": "https://cdn.example.com/full.jpg"},
                    "rect": {"top": 1200, "height": 200, "width": 300},
                    "children": [{"tag": "IMG", "attrs": {"src": "thumb.jpg"}}]
                }]
            }"#,
        )
        .unwrap();

        let page = snapshot.build().unwrap();
        assert_eq!(page.scroll_y(), 250.0);
        let images = page.images();
        assert_eq!(images.len(), 1);
        let img = page.get(images[0]).unwrap();
        assert_eq!(img.tag, "img");
        assert_eq!(img.layout.top, 1200.0);
        assert_eq!(img.layout.width, 300.0);
    }

    #[test]
    fn snapshot_rejects_invalid_base_url() {
        let snapshot = PageSnapshot::empty("not a url");
        assert!(snapshot.build().is_err());
    }
}
