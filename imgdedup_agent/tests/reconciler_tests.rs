mod support;

use imgdedup_agent::{
    filename_from_href, AgentError, ApplyOutcome, GalleryDom, MemoryGallery, Reconciler,
};
use imgdedup_protocol::DuplicateReport;
use proptest::prelude::*;
use std::collections::HashSet;
use support::{poster_hrefs, POSTERS_PAGE};
use url::Url;

fn page() -> Url {
    Url::parse(POSTERS_PAGE).expect("page url")
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Filenames as the page shows them, first occurrence only.
fn page_filenames(dom: &MemoryGallery) -> Vec<String> {
    let base = page();
    let mut out: Vec<String> = Vec::new();
    for name in dom.hrefs().iter().filter_map(|h| filename_from_href(&base, h)) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[test]
fn filename_is_last_path_segment() {
    let base = page();
    assert_eq!(
        filename_from_href(&base, "/t/p/original/abc.jpg").as_deref(),
        Some("abc.jpg")
    );
    assert_eq!(
        filename_from_href(&base, "https://image.tmdb.org/t/p/w500/xyz.png?x=1").as_deref(),
        Some("xyz.png")
    );
    assert_eq!(filename_from_href(&base, "").as_deref(), None);
    assert_eq!(filename_from_href(&base, "/t/p/original/").as_deref(), None);
    assert_eq!(filename_from_href(&base, "/t/p/original/noext").as_deref(), None);
}

#[test]
fn catalog_dedups_in_first_seen_order() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "a.jpg", "c.jpg"]));
    let mut r = Reconciler::new(page());
    let catalog = r.capture_catalog(&dom).expect("catalog");
    assert_eq!(catalog.as_slice(), names(&["a.jpg", "b.jpg", "c.jpg"]).as_slice());
    assert_eq!(r.state().original_order, names(&["a.jpg", "b.jpg", "c.jpg"]));
}

#[test]
fn end_to_end_sort_highlight_and_reset() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "a.jpg", "c.jpg"]));
    let mut r = Reconciler::new(page());
    r.capture_catalog(&dom).expect("catalog");

    let report = DuplicateReport {
        duplicate_images: names(&["a.jpg", "c.jpg"]),
        sorted_images: names(&["a.jpg", "c.jpg", "b.jpg"]),
        ..Default::default()
    };
    let outcome = r.apply_report(&dom, &report).expect("apply");
    assert_eq!(outcome, ApplyOutcome::Highlighted { duplicates: 2 });
    assert_eq!(
        dom.hrefs(),
        poster_hrefs(&["a.jpg", "a.jpg", "c.jpg", "b.jpg"])
    );
    assert_eq!(
        dom.highlighted(),
        poster_hrefs(&["a.jpg", "a.jpg", "c.jpg"])
    );
    assert!(r.is_sorted());

    r.reset_to_original(&dom).expect("reset");
    assert_eq!(page_filenames(&dom), names(&["a.jpg", "b.jpg", "c.jpg"]));
    assert_eq!(dom.hrefs(), poster_hrefs(&["a.jpg", "a.jpg", "b.jpg", "c.jpg"]));
    assert!(dom.highlighted().is_empty());
    assert!(!r.is_sorted());
}

#[test]
fn repeated_image_sorts_to_its_group_and_only_it_is_highlighted() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "a.jpg", "c.jpg"]));
    let mut r = Reconciler::new(page());
    r.capture_catalog(&dom).expect("catalog");

    r.apply_result(&dom, &names(&["c.jpg", "a.jpg", "b.jpg"]), &set(&["a.jpg"]))
        .expect("apply");

    assert_eq!(page_filenames(&dom), names(&["c.jpg", "a.jpg", "b.jpg"]));
    assert_eq!(
        dom.hrefs(),
        poster_hrefs(&["c.jpg", "a.jpg", "a.jpg", "b.jpg"])
    );
    assert_eq!(dom.highlighted(), poster_hrefs(&["a.jpg", "a.jpg"]));
    for other in poster_hrefs(&["b.jpg", "c.jpg"]) {
        assert!(!dom.highlighted().contains(&other), "{other} highlighted");
    }
}

#[test]
fn unknown_items_go_last_in_current_order() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["x.jpg", "a.jpg", "y.jpg", "b.jpg"]));
    let mut r = Reconciler::new(page());
    r.apply_result(&dom, &names(&["b.jpg", "a.jpg"]), &set(&["b.jpg"]))
        .expect("apply");
    assert_eq!(
        dom.hrefs(),
        poster_hrefs(&["b.jpg", "a.jpg", "x.jpg", "y.jpg"])
    );
}

#[test]
fn applying_the_same_result_twice_changes_nothing() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "c.jpg"]));
    let mut r = Reconciler::new(page());
    let sorted = names(&["c.jpg", "a.jpg", "b.jpg"]);
    let dups = set(&["c.jpg", "a.jpg"]);
    r.apply_result(&dom, &sorted, &dups).expect("first");
    let after_first = dom.mutation_count();
    r.apply_result(&dom, &sorted, &dups).expect("second");
    assert_eq!(dom.mutation_count(), after_first);
}

#[test]
fn zero_duplicates_leaves_unsorted_page_alone() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg"]));
    let mut r = Reconciler::new(page());
    r.capture_catalog(&dom).expect("catalog");
    let report = DuplicateReport {
        sorted_images: names(&["b.jpg", "a.jpg"]),
        ..Default::default()
    };
    assert_eq!(r.apply_report(&dom, &report).expect("apply"), ApplyOutcome::Unchanged);
    assert_eq!(dom.mutation_count(), 0);
}

#[test]
fn zero_duplicates_resets_a_sorted_page() {
    let hrefs = poster_hrefs(&["a.jpg", "b.jpg", "c.jpg"]);
    let dom = MemoryGallery::from_hrefs(&hrefs);
    let mut r = Reconciler::new(page());
    r.capture_catalog(&dom).expect("catalog");
    r.apply_report(
        &dom,
        &DuplicateReport {
            duplicate_images: names(&["c.jpg", "b.jpg"]),
            sorted_images: names(&["c.jpg", "b.jpg", "a.jpg"]),
            ..Default::default()
        },
    )
    .expect("apply");

    let outcome = r.apply_report(&dom, &DuplicateReport::default()).expect("apply empty");
    assert_eq!(outcome, ApplyOutcome::Reset);
    assert_eq!(dom.hrefs(), hrefs);
    assert!(dom.highlighted().is_empty());
}

#[test]
fn new_request_is_taken_from_the_unsorted_page() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg", "c.jpg"]));
    let mut r = Reconciler::new(page());
    r.apply_result(&dom, &names(&["c.jpg", "b.jpg", "a.jpg"]), &set(&["c.jpg"]))
        .expect("apply");
    let catalog = r.prepare_request(&dom).expect("prepare");
    assert_eq!(catalog.as_slice(), names(&["a.jpg", "b.jpg", "c.jpg"]).as_slice());
    assert!(!r.is_sorted());
}

#[test]
fn malformed_items_are_skipped() {
    let dom = MemoryGallery::from_hrefs(&poster_hrefs(&["a.jpg", "b.jpg"]));
    dom.push_item_without_href();
    dom.push_item_without_info_block("/t/p/original/c.jpg");
    let mut r = Reconciler::new(page());

    let catalog = r.capture_catalog(&dom).expect("catalog");
    assert_eq!(catalog.as_slice(), names(&["a.jpg", "b.jpg", "c.jpg"]).as_slice());

    // The item with no info block cannot be highlighted; the rest still is.
    r.apply_result(&dom, &names(&["c.jpg", "b.jpg", "a.jpg"]), &set(&["c.jpg", "b.jpg"]))
        .expect("apply");
    assert_eq!(dom.highlighted(), poster_hrefs(&["b.jpg"]));
    assert_eq!(dom.list_items().map(|i| i.len()), Some(4));
}

#[test]
fn missing_list_container_is_reported() {
    let dom = MemoryGallery::without_list();
    let mut r = Reconciler::new(page());
    assert!(matches!(
        r.capture_catalog(&dom),
        Err(AgentError::DomPreconditionMissing(_))
    ));
}

fn gallery_of(items: &[String]) -> MemoryGallery {
    let names: Vec<&str> = items.iter().map(String::as_str).collect();
    MemoryGallery::from_hrefs(&poster_hrefs(&names))
}

fn gallery_names() -> impl Strategy<Value = Vec<String>> {
    let pool = vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"];
    prop::collection::vec(prop::sample::select(pool), 0..12)
        .prop_map(|v| v.into_iter().map(String::from).collect())
}

fn reversed(sorted: &[String]) -> Vec<String> {
    sorted.iter().rev().cloned().collect()
}

proptest! {
    #[test]
    fn catalog_has_no_repeats_and_keeps_first_seen_order(items in gallery_names()) {
        let dom = gallery_of(&items);
        let mut r = Reconciler::new(page());
        let catalog = r.capture_catalog(&dom).expect("catalog");

        let mut expected: Vec<String> = Vec::new();
        for name in &items {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(catalog.into_vec(), expected);
    }

    #[test]
    fn apply_result_is_idempotent(
        items in gallery_names(),
        sorted in gallery_names(),
        dups in gallery_names(),
    ) {
        let dom = gallery_of(&items);
        let dups: HashSet<String> = dups.into_iter().collect();
        let mut r = Reconciler::new(page());

        r.apply_result(&dom, &sorted, &dups).expect("first");
        let order = dom.hrefs();
        let highlighted = dom.highlighted();
        let count = dom.mutation_count();

        r.apply_result(&dom, &sorted, &dups).expect("second");
        prop_assert_eq!(dom.hrefs(), order);
        prop_assert_eq!(dom.highlighted(), highlighted);
        prop_assert_eq!(dom.mutation_count(), count);
    }

    #[test]
    fn reset_restores_the_captured_order(items in gallery_names(), sorted in gallery_names()) {
        let dom = gallery_of(&items);
        let mut r = Reconciler::new(page());
        let captured = r.capture_catalog(&dom).expect("catalog").into_vec();
        r.apply_result(&dom, &sorted, &HashSet::new()).expect("apply");
        r.apply_result(&dom, &reversed(&sorted), &HashSet::new()).expect("apply again");
        r.reset_to_original(&dom).expect("reset");
        prop_assert_eq!(page_filenames(&dom), captured);
    }
}
