use crate::threshold::WidgetValues;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Opaque handle for one list item, stable across reorders.
pub type ItemId = usize;

/// The host page as the agent sees it: an ordered image list plus a header
/// the control widgets live in.
pub trait GalleryDom {
    /// Items in current display order, or `None` when the list container is
    /// not on the page.
    fn list_items(&self) -> Option<Vec<ItemId>>;
    fn item_href(&self, item: ItemId) -> Option<String>;
    /// Adds or removes the highlight class on the item's info block.
    fn set_highlight(&self, item: ItemId, on: bool) -> Result<(), String>;
    /// Re-appends the items so they display in `order`.
    fn reorder(&self, order: &[ItemId]) -> Result<(), String>;

    fn has_header(&self) -> bool;
    fn render_controls(&self, widgets: &WidgetValues) -> Result<(), String>;

    fn reload(&self);
}

#[derive(Debug, Clone)]
struct MemoryItem {
    href: Option<String>,
    has_info_block: bool,
    highlighted: bool,
}

#[derive(Debug, Default)]
struct MemoryPage {
    items: Vec<MemoryItem>,
    order: Vec<ItemId>,
    controls: Option<WidgetValues>,
}

/// A `GalleryDom` held in memory, built from a list of hrefs. Backs the CLI
/// page snapshots and the tests.
#[derive(Debug)]
pub struct MemoryGallery {
    page: Mutex<MemoryPage>,
    has_list: bool,
    has_header: bool,
    mutations: AtomicUsize,
    reloads: AtomicUsize,
}

impl MemoryGallery {
    pub fn from_hrefs<S: AsRef<str>>(hrefs: &[S]) -> Self {
        let items = hrefs
            .iter()
            .map(|h| MemoryItem {
                href: Some(h.as_ref().to_string()),
                has_info_block: true,
                highlighted: false,
            })
            .collect::<Vec<_>>();
        Self::with_items(items, true)
    }

    /// A page whose list container has not been rendered.
    pub fn without_list() -> Self {
        Self::with_items(Vec::new(), false)
    }

    fn with_items(items: Vec<MemoryItem>, has_list: bool) -> Self {
        let order = (0..items.len()).collect();
        Self {
            page: Mutex::new(MemoryPage {
                items,
                order,
                controls: None,
            }),
            has_list,
            has_header: has_list,
            mutations: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    /// Appends an item without a link.
    pub fn push_item_without_href(&self) -> ItemId {
        self.push(MemoryItem {
            href: None,
            has_info_block: true,
            highlighted: false,
        })
    }

    /// Appends an item with a link but no info block to highlight.
    pub fn push_item_without_info_block(&self, href: &str) -> ItemId {
        self.push(MemoryItem {
            href: Some(href.to_string()),
            has_info_block: false,
            highlighted: false,
        })
    }

    fn push(&self, item: MemoryItem) -> ItemId {
        let Ok(mut page) = self.page.lock() else {
            return usize::MAX;
        };
        let id = page.items.len();
        page.items.push(item);
        page.order.push(id);
        id
    }

    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    /// Hrefs in display order; items without a link show as an empty string.
    pub fn hrefs(&self) -> Vec<String> {
        let Ok(page) = self.page.lock() else {
            return Vec::new();
        };
        page.order
            .iter()
            .map(|&id| page.items[id].href.clone().unwrap_or_default())
            .collect()
    }

    /// Hrefs of highlighted items, in display order.
    pub fn highlighted(&self) -> Vec<String> {
        let Ok(page) = self.page.lock() else {
            return Vec::new();
        };
        page.order
            .iter()
            .map(|&id| &page.items[id])
            .filter(|item| item.highlighted)
            .map(|item| item.href.clone().unwrap_or_default())
            .collect()
    }

    pub fn controls(&self) -> Option<WidgetValues> {
        self.page.lock().ok().and_then(|p| p.controls.clone())
    }

    /// Number of reorders and highlight changes that actually altered the page.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::Relaxed)
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl GalleryDom for MemoryGallery {
    fn list_items(&self) -> Option<Vec<ItemId>> {
        if !self.has_list {
            return None;
        }
        self.page.lock().ok().map(|p| p.order.clone())
    }

    fn item_href(&self, item: ItemId) -> Option<String> {
        let page = self.page.lock().ok()?;
        page.items.get(item)?.href.clone()
    }

    fn set_highlight(&self, item: ItemId, on: bool) -> Result<(), String> {
        let Ok(mut page) = self.page.lock() else {
            return Err("page lock poisoned".to_string());
        };
        let Some(entry) = page.items.get_mut(item) else {
            return Err(format!("no item {item}"));
        };
        if !entry.has_info_block {
            return Err(format!("item {item} has no info block"));
        }
        if entry.highlighted != on {
            entry.highlighted = on;
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn reorder(&self, order: &[ItemId]) -> Result<(), String> {
        let Ok(mut page) = self.page.lock() else {
            return Err("page lock poisoned".to_string());
        };
        let mut sorted_new = order.to_vec();
        sorted_new.sort_unstable();
        let mut sorted_old = page.order.clone();
        sorted_old.sort_unstable();
        if sorted_new != sorted_old {
            return Err("reorder must be a permutation of the current items".to_string());
        }
        if page.order != order {
            page.order = order.to_vec();
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn has_header(&self) -> bool {
        self.has_header
    }

    fn render_controls(&self, widgets: &WidgetValues) -> Result<(), String> {
        if !self.has_header {
            return Err("header container missing".to_string());
        }
        let Ok(mut page) = self.page.lock() else {
            return Err("page lock poisoned".to_string());
        };
        page.controls = Some(widgets.clone());
        Ok(())
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }
}
