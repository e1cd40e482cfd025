use crate::channel::Channel;
use crate::dom::{GalleryDom, ItemId};
use crate::error::AgentError;
use crate::protocol::{ClientCommand, DuplicateQuery, DuplicateReport, ImageType};
use crate::threshold::ThresholdConfig;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use url::Url;

/// Unique filenames in first-seen page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCatalog(Vec<String>);

impl ImageCatalog {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    /// Page order before any reordering. Authoritative for restoring the page.
    pub original_order: Vec<String>,
    pub duplicate_set: HashSet<String>,
    pub is_sorted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No duplicates and nothing to undo; the page was not touched.
    Unchanged,
    /// No duplicates; a previous highlight was undone.
    Reset,
    Highlighted { duplicates: usize },
}

/// Resolves `href` the way the page would and returns its last path segment,
/// provided it looks like a file (`name.ext`).
pub fn filename_from_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let url = base.join(href).ok()?;
    let name = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// Reads the gallery into a catalog and re-renders it from duplicate reports.
#[derive(Debug, Clone)]
pub struct Reconciler {
    page_base: Url,
    state: SortState,
}

impl Reconciler {
    pub fn new(page_base: Url) -> Self {
        Self {
            page_base,
            state: SortState::default(),
        }
    }

    pub fn state(&self) -> &SortState {
        &self.state
    }

    pub fn is_sorted(&self) -> bool {
        self.state.is_sorted
    }

    pub fn capture_catalog(&mut self, dom: &dyn GalleryDom) -> Result<ImageCatalog, AgentError> {
        let scanned = self.scan(dom)?;
        let catalog = dedup_filenames(&scanned);
        if !self.state.is_sorted {
            self.state.original_order = catalog.0.clone();
        }
        debug!(images = catalog.len(), sorted = self.state.is_sorted, "captured catalog");
        Ok(catalog)
    }

    /// Reorders the live list to follow `sorted_images` and recomputes every
    /// highlight from scratch, so applying the same result twice changes nothing.
    /// Items whose filename is not in `sorted_images` go last, in their current
    /// relative order.
    pub fn apply_result(
        &mut self,
        dom: &dyn GalleryDom,
        sorted_images: &[String],
        duplicates: &HashSet<String>,
    ) -> Result<(), AgentError> {
        let scanned = self.scan(dom)?;
        if !self.state.is_sorted {
            self.state.original_order = dedup_filenames(&scanned).into_vec();
        }

        let mut rank: HashMap<&str, usize> = HashMap::new();
        for (i, name) in sorted_images.iter().enumerate() {
            rank.entry(name.as_str()).or_insert(i);
        }

        let current: Vec<ItemId> = scanned.iter().map(|(item, _)| *item).collect();
        let mut ranked: Vec<(usize, ItemId)> = scanned
            .iter()
            .map(|(item, name)| {
                let r = name
                    .as_deref()
                    .and_then(|n| rank.get(n).copied())
                    .unwrap_or(usize::MAX);
                (r, *item)
            })
            .collect();
        // Stable: equal ranks keep their current order.
        ranked.sort_by_key(|(r, _)| *r);
        let order: Vec<ItemId> = ranked.into_iter().map(|(_, item)| item).collect();

        if order != current {
            dom.reorder(&order).map_err(AgentError::DomPreconditionMissing)?;
        }

        for (item, name) in &scanned {
            let on = name.as_ref().is_some_and(|n| duplicates.contains(n));
            if let Err(e) = dom.set_highlight(*item, on) {
                warn!(item, "could not update highlight: {e}");
            }
        }

        self.state.duplicate_set = duplicates.clone();
        self.state.is_sorted = true;
        Ok(())
    }

    pub fn reset_to_original(&mut self, dom: &dyn GalleryDom) -> Result<(), AgentError> {
        let original = self.state.original_order.clone();
        self.apply_result(dom, &original, &HashSet::new())?;
        self.state.is_sorted = false;
        info!(images = original.len(), "gallery restored to original order");
        Ok(())
    }

    pub fn apply_report(
        &mut self,
        dom: &dyn GalleryDom,
        report: &DuplicateReport,
    ) -> Result<ApplyOutcome, AgentError> {
        if report.duplicate_images.is_empty() {
            if self.state.is_sorted {
                self.reset_to_original(dom)?;
                return Ok(ApplyOutcome::Reset);
            }
            return Ok(ApplyOutcome::Unchanged);
        }

        let duplicates: HashSet<String> = report.duplicate_images.iter().cloned().collect();
        self.apply_result(dom, &report.sorted_images, &duplicates)?;
        info!(duplicates = duplicates.len(), "duplicate report applied");
        Ok(ApplyOutcome::Highlighted {
            duplicates: duplicates.len(),
        })
    }

    /// Catalog for a new request, always taken from the unsorted page.
    pub fn prepare_request(&mut self, dom: &dyn GalleryDom) -> Result<ImageCatalog, AgentError> {
        if self.state.is_sorted {
            self.reset_to_original(dom)?;
        }
        self.capture_catalog(dom)
    }

    fn scan(&self, dom: &dyn GalleryDom) -> Result<Vec<(ItemId, Option<String>)>, AgentError> {
        let items = dom
            .list_items()
            .ok_or_else(|| AgentError::DomPreconditionMissing("image list container".to_string()))?;
        Ok(items
            .into_iter()
            .map(|item| {
                let name = dom
                    .item_href(item)
                    .and_then(|href| filename_from_href(&self.page_base, &href));
                if name.is_none() {
                    debug!(item, "item has no resolvable filename");
                }
                (item, name)
            })
            .collect())
    }
}

fn dedup_filenames(scanned: &[(ItemId, Option<String>)]) -> ImageCatalog {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (_, name) in scanned {
        let Some(name) = name else { continue };
        if seen.insert(name.as_str()) {
            names.push(name.clone());
        }
    }
    ImageCatalog(names)
}

/// Sends a duplicate check for `catalog`. Nothing goes out unless the channel is open.
pub fn request_duplicate_check(
    channel: &Channel,
    catalog: &ImageCatalog,
    image_type: ImageType,
    threshold: ThresholdConfig,
    request_id: Option<u64>,
) -> Result<(), AgentError> {
    if !channel.is_open() {
        return Err(AgentError::RequestRejectedOffline);
    }
    let frame = ClientCommand::FindDuplicateImages(DuplicateQuery {
        images: catalog.as_slice().to_vec(),
        image_type,
        min_similarity_threshold: threshold.value(),
        request_id,
    })
    .to_frame()?;
    channel.send(frame)?;
    info!(
        images = catalog.len(),
        %image_type,
        threshold = threshold.value(),
        ?request_id,
        "duplicate check requested"
    );
    Ok(())
}
