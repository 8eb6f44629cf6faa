use serde::Deserialize;

use crate::page::{ElementId, NodeSpec};

/// One line of the inbound JSON event stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    SetMode {
        #[serde(default)]
        mode: Option<String>,
    },
    Scroll {
        y: f64,
    },
    Resize {
        viewport_height: f64,
    },
    Insert {
        #[serde(default)]
        parent: Option<ElementId>,
        node: NodeSpec,
    },
    Remove {
        id: ElementId,
    },
}

/// Blank lines and `#` comments carry no event.
pub fn parse_event(line: &str) -> Result<Option<HostEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
