//! Static catalog of taggable cultivators.

use cultigrid_protocol::Tag;
use std::sync::{Arc, OnceLock};

const CATALOG: &[(&str, &str, &str)] = &[
    ("aeriz", "AERIZ", "emerald"),
    ("alien-labs", "ALIEN LABS", "violet"),
    ("cannabiotix", "CANNABIOTIX", "sky"),
    ("connected", "CONNECTED", "amber"),
    ("cookies", "COOKIES", "blue"),
    ("doja", "DOJA", "rose"),
    ("fig-farms", "FIG FARMS", "lime"),
    ("jungle-boys", "JUNGLE BOYS", "green"),
    ("lowell", "LOWELL", "orange"),
    ("maven", "MAVEN", "indigo"),
    ("packwoods", "PACKWOODS", "stone"),
    ("raw-garden", "RAW GARDEN", "teal"),
    ("stiiizy", "STIIIZY", "zinc"),
    ("wonderbrett", "WONDERBRETT", "fuchsia"),
];

static TAGS: OnceLock<Vec<Arc<Tag>>> = OnceLock::new();

/// Every registered tag, in catalog order.
pub fn list() -> &'static [Arc<Tag>] {
    TAGS.get_or_init(|| {
        CATALOG
            .iter()
            .map(|(id, name, color_key)| {
                Arc::new(Tag {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    color_key: (*color_key).to_string(),
                })
            })
            .collect()
    })
}

/// Resolve a tag id to the shared registry entry.
pub fn lookup(id: &str) -> Option<Arc<Tag>> {
    list().iter().find(|t| t.id == id).cloned()
}
