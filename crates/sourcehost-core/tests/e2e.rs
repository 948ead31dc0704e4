//! End-to-end scenarios S1-S4 and S6 from spec.md §8, driven against a fake
//! HTTP bridge and a hand-assembled WAT stub "plugin" whose exports simply
//! echo fixed postcard-encoded fixtures — no external toolchain is needed to
//! build these fixtures (see `SPEC_FULL.md`'s "Test tooling" section).
//!
//! (S5, the canvas image round-trip, lives in `sourcehost-canvas` behind the
//! `canvas` feature; it needs a real PNG decode/encode round-trip rather
//! than a canned postcard payload and doesn't fit this file's fixture
//! style.)

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use sourcehost_core::{
    BridgeError, BridgeRequest, BridgeResponse, Chapter, Filter, GenreDefault, HomeComponent, HomeComponentValue,
    HomeLayout, HttpBridge, Manga, MangaStatus, NullSettingsStore, Page, PageEntry, Plugin, PluginManifest,
    ResourceTable, ResourceKind, ResourcePayload, RuntimeConfig, SortDefault, Value,
};

struct DeadBridge;
impl HttpBridge for DeadBridge {
    fn send(&self, _request: BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        Err(BridgeError::Failed("no network in end-to-end tests".into()))
    }
}

fn manifest() -> PluginManifest {
    PluginManifest::parse(
        r#"{
            "info": {
                "id": "e2e-source",
                "name": "E2E Source",
                "lang": "en",
                "version": "1.0.0",
                "urls": ["https://example.com"],
                "languages": ["en"],
                "contentRating": "safe"
            }
        }"#,
    )
    .unwrap()
}

/// Hex-escapes `bytes` into a WAT string literal body (`\xx` per byte),
/// since WAT's data-segment strings are the only way to embed arbitrary
/// binary without a separate toolchain.
fn wat_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// The modern-ABI result-pointer framing spec.md §4.2 describes: a 4-byte
/// LE total length (header included), a 4-byte capacity the reader ignores,
/// then the payload.
fn framed(payload: &[u8]) -> Vec<u8> {
    let total_len = (8 + payload.len()) as i32;
    let mut out = Vec::with_capacity(total_len as usize);
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// A WAT module exporting `name` with `param_count` ignored `i32` params
/// that always returns a canned modern-ABI result pointer framing `payload`.
fn stub_module(export_name: &str, param_count: usize, payload: &[u8]) -> String {
    let data = wat_escape(&framed(payload));
    let params = if param_count == 0 { String::new() } else { format!("(param{})", " i32".repeat(param_count)) };
    format!(
        r#"(module
            (memory (export "memory") 4)
            (data (i32.const 4096) "{data}")
            (func (export "{export_name}") {params} (result i32) i32.const 4096))"#
    )
}

fn load(wat: &str) -> Plugin {
    let bridge: Arc<dyn HttpBridge> = Arc::new(DeadBridge);
    let settings = Arc::new(NullSettingsStore);
    Plugin::load(wat.as_bytes(), manifest(), RuntimeConfig::default(), bridge, settings.clone(), settings)
        .expect("stub module should compile and instantiate")
}

fn postcard_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    postcard::to_allocvec(value).unwrap()
}

// ---- S1: manga fixture round-trips through get_manga_update -------------

#[test]
fn s1_manga_update_decodes_the_fixture_and_request_encoding_matches_the_wire_table() {
    let request = Manga::stub("m1", "T");
    let encoded_request = postcard_bytes(&request);
    // "m1" as a postcard string: varint length 2, then the two bytes.
    let mut expected_prefix = vec![2u8, b'm', b'1'];
    // "T" as a postcard string: varint length 1, then the byte.
    expected_prefix.extend_from_slice(&[1u8, b'T']);
    // cover, authors, artists, description, url, tags: six consecutive
    // `Option::None` tags (one byte each, value 0).
    expected_prefix.extend_from_slice(&[0u8; 6]);
    assert!(
        encoded_request.starts_with(&expected_prefix),
        "encoded request {encoded_request:?} should begin with {expected_prefix:?}"
    );

    let fixture = Manga {
        key: "m1".into(),
        title: "Updated Title".into(),
        cover: Some("https://example.com/cover.jpg".into()),
        authors: Some(vec!["Author A".into()]),
        artists: None,
        description: Some("A description.".into()),
        url: Some("https://example.com/m1".into()),
        tags: Some(vec!["Action".into(), "Drama".into()]),
        status: MangaStatus::Ongoing,
        content_rating: sourcehost_core::ContentRating::Safe,
        viewer: 0,
        update_strategy: 0,
        next_update: None,
        chapters: None,
    };
    let update = sourcehost_core::MangaUpdate { manga: Some(fixture), chapters: None };
    let payload = postcard_bytes(&update);

    let mut plugin = load(&stub_module("get_manga_update", 3, &payload));
    let decoded = plugin.get_manga_update(&request, true, false).unwrap();
    let manga = decoded.manga.expect("fixture carries a manga");
    assert_eq!(manga.key, "m1");
    assert_eq!(manga.title, "Updated Title");
    assert_eq!(manga.authors.as_deref(), Some(&["Author A".to_string()][..]));
    assert!(matches!(manga.status, MangaStatus::Ongoing));
}

// ---- S2: page list decodes three Url-variant pages in order --------------

#[test]
fn s2_page_list_decodes_three_url_pages_in_order() {
    let pages = vec![
        PageEntry { page: Page::Url("u1".into(), None), thumbnail: None, has_description: false, description: None },
        PageEntry { page: Page::Url("u2".into(), None), thumbnail: None, has_description: false, description: None },
        PageEntry { page: Page::Url("u3".into(), None), thumbnail: None, has_description: false, description: None },
    ];
    let payload = postcard_bytes(&pages);

    let mut plugin = load(&stub_module("get_page_list", 2, &payload));
    let manga = Manga::stub("m1", "T");
    let chapter = Chapter {
        key: "c1".into(),
        title: None,
        chapter: Some(1.0),
        volume: None,
        date_upload: None,
        scanlators: None,
        url: None,
        lang: None,
        thumbnail: None,
        locked: false,
    };
    let decoded = plugin.get_page_list(&manga, &chapter).unwrap();
    assert_eq!(decoded.len(), 3);
    for (i, expected_url) in ["u1", "u2", "u3"].into_iter().enumerate() {
        match &decoded[i].page {
            Page::Url(url, context) => {
                assert_eq!(url, expected_url);
                assert!(context.is_none());
            }
            other => panic!("expected Url variant at index {i}, got {other:?}"),
        }
        assert!(decoded[i].thumbnail.is_none());
        assert!(!decoded[i].has_description);
    }
}

// ---- S3: filters decode Title / Sort / Genre with their exact fields -----

#[test]
fn s3_filters_decode_title_sort_and_genre_with_exact_fields() {
    let filters = vec![
        Filter::Title("Title".into()),
        Filter::Sort(
            "Sort".into(),
            vec!["a".into(), "b".into()],
            SortDefault { index: 0, ascending: false },
            true,
        ),
        Filter::Genre("Genre".into(), vec!["x".into()], true, Vec::<GenreDefault>::new()),
    ];
    let payload = postcard_bytes(&filters);

    let mut plugin = load(&stub_module("get_filters", 0, &payload));
    let decoded = plugin.get_filters().unwrap();
    assert_eq!(decoded.len(), 3);

    match &decoded[0] {
        Filter::Title(name) => assert_eq!(name, "Title"),
        other => panic!("expected Title, got {other:?}"),
    }
    match &decoded[1] {
        Filter::Sort(name, options, default, can_ascend) => {
            assert_eq!(name, "Sort");
            assert_eq!(options, &vec!["a".to_string(), "b".to_string()]);
            assert_eq!(default.index, 0);
            assert!(!default.ascending);
            assert!(*can_ascend);
        }
        other => panic!("expected Sort, got {other:?}"),
    }
    match &decoded[2] {
        Filter::Genre(name, options, can_exclude, defaults) => {
            assert_eq!(name, "Genre");
            assert_eq!(options, &vec!["x".to_string()]);
            assert!(*can_exclude);
            assert!(defaults.is_empty());
        }
        other => panic!("expected Genre, got {other:?}"),
    }
}

// ---- S4: home partials accumulate in emission order ----------------------

/// Structurally identical to the crate-private `PartialHomeWire` used by
/// `env.send_partial_result` — postcard encodes by shape, not by type name,
/// so this produces byte-identical wire data for the `Component` variant.
#[derive(Serialize)]
#[allow(dead_code)]
enum PartialWire {
    Layout(HomeLayout),
    Component(HomeComponent),
}

fn component(title: &str) -> HomeComponent {
    HomeComponent { title: Some(title.into()), subtitle: None, value: HomeComponentValue::Scroller }
}

#[test]
fn s4_home_partials_accumulate_in_emission_order() {
    let c1 = postcard_bytes(&PartialWire::Component(component("First")));
    let c2 = postcard_bytes(&PartialWire::Component(component("Second")));
    let c3 = postcard_bytes(&PartialWire::Component(component("Third")));

    // A data segment per partial, each passed to `env.send_partial_result`
    // in turn before the export returns an empty final layout (`i32.const 0`).
    let data = format!(
        "{}{}{}",
        wat_escape(&c1),
        wat_escape(&c2),
        wat_escape(&c3)
    );
    let wat = format!(
        r#"(module
            (import "env" "send_partial_result" (func $send (param i32 i32) (result i32)))
            (memory (export "memory") 4)
            (data (i32.const 4096) "{data}")
            (func (export "get_home") (result i32)
                (drop (call $send (i32.const {o1}) (i32.const {l1})))
                (drop (call $send (i32.const {o2}) (i32.const {l2})))
                (drop (call $send (i32.const {o3}) (i32.const {l3})))
                i32.const 0))"#,
        o1 = 4096,
        l1 = c1.len(),
        o2 = 4096 + c1.len(),
        l2 = c2.len(),
        o3 = 4096 + c1.len() + c2.len(),
        l3 = c3.len(),
    );

    let mut plugin = load(&wat);
    let mut seen: Vec<HomeLayout> = Vec::new();
    let layout = plugin
        .get_home(Some(Box::new(|snapshot: HomeLayout| {
            seen.push(snapshot);
        })))
        .unwrap()
        .expect("three accumulated components should be returned");

    let titles: Vec<&str> = layout.components.iter().map(|c| c.title.as_deref().unwrap()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);

    // The final callback invocation carries all three accumulated so far.
    let last = seen.last().unwrap();
    let last_titles: Vec<&str> = last.components.iter().map(|c| c.title.as_deref().unwrap()).collect();
    assert_eq!(last_titles, vec!["First", "Second", "Third"]);
}

// ---- S6: sweeper reclaims rids a plugin never destroyed -------------------

#[test]
fn s6_sweeper_reclaims_leaked_zero_refcount_descriptors_past_the_age_threshold() {
    let table = ResourceTable::new();
    let mut rids = Vec::new();
    for i in 0i64..10 {
        rids.push(table.allocate(ResourcePayload::Value(Value::Int(i)), ResourceKind::Value));
    }
    // The plugin "destroys" 7 of the 10 through the unified destroy import.
    for rid in &rids[..7] {
        assert!(table.destroy(*rid));
    }
    assert_eq!(table.len(), 3, "3 rids should remain leaked");

    // Advanced past the descriptor-age threshold with refcount zero: the
    // sweeper removes every one of them.
    let removed = table.sweep(Duration::from_secs(0), Duration::from_secs(600), 10_000, 1_000);
    assert_eq!(removed, 3);
    assert_eq!(table.len(), 0);
    for rid in &rids[7..] {
        assert!(!table.contains(*rid));
    }
}
