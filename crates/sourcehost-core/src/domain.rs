//! Domain entities exchanged across the ABI (spec.md §3.2, §4.3, §6).
//!
//! Field order in every struct and variant order in every enum mirrors the
//! wire tables exactly: these types are fed straight to `postcard`, so
//! reordering a field changes the bytes on the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MangaStatus {
    Unknown = 0,
    Ongoing = 1,
    Completed = 2,
    Cancelled = 3,
    Hiatus = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContentRating {
    Safe = 0,
    Suggestive = 1,
    Nsfw = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manga {
    pub key: String,
    pub title: String,
    pub cover: Option<String>,
    pub authors: Option<Vec<String>>,
    pub artists: Option<Vec<String>>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: MangaStatus,
    pub content_rating: ContentRating,
    pub viewer: u8,
    pub update_strategy: u8,
    pub next_update: Option<i64>,
    pub chapters: Option<Vec<Chapter>>,
}

impl Manga {
    /// A manga value carrying only the required `key`/`title` fields, the
    /// way `get_manga_update` builds a request payload before the plugin
    /// fills in the rest.
    pub fn stub(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            cover: None,
            authors: None,
            artists: None,
            description: None,
            url: None,
            tags: None,
            status: MangaStatus::Unknown,
            content_rating: ContentRating::Safe,
            viewer: 0,
            update_strategy: 0,
            next_update: None,
            chapters: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub key: String,
    pub title: Option<String>,
    pub chapter: Option<f32>,
    pub volume: Option<f32>,
    pub date_upload: Option<i64>,
    pub scanlators: Option<Vec<String>>,
    pub url: Option<String>,
    pub lang: Option<String>,
    pub thumbnail: Option<String>,
    pub locked: bool,
}

/// Tags 0/1/2 fixed by spec.md §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Page {
    Url(String, Option<HashMap<String, String>>),
    Text(String),
    Zip(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    pub page: Page,
    pub thumbnail: Option<String>,
    pub has_description: bool,
    pub description: Option<String>,
}

/// The filter *descriptor* the plugin advertises (`get_filters`). Tags 0-6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Filter {
    Title(String),
    Author(String),
    Select(String, Vec<String>, i32),
    Sort(String, Vec<String>, SortDefault, bool),
    Check(String, Option<bool>),
    Group(String, Vec<Filter>),
    Genre(String, Vec<String>, bool, Vec<GenreDefault>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortDefault {
    pub index: i32,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreDefault {
    pub index: i32,
    pub state: i32,
}

/// The filter *value* the host sends back to the plugin on search (wire
/// tags 0-5). `Range` is accepted on the wire but the host never produces
/// it — see [`FilterValue::from_range`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String, String),
    Sort(String, i32, bool),
    Check(String, i32),
    Select(String, String),
    MultiSelect(String, Vec<String>, Vec<String>),
    Range(String, Option<f32>, Option<f32>),
}

impl FilterValue {
    pub fn id(&self) -> &str {
        match self {
            FilterValue::Text(id, _)
            | FilterValue::Sort(id, _, _)
            | FilterValue::Check(id, _)
            | FilterValue::Select(id, _)
            | FilterValue::MultiSelect(id, _, _)
            | FilterValue::Range(id, _, _) => id,
        }
    }

    /// The host maps an incoming `Range` filter value onto the neutral
    /// `Group` filter descriptor with no narrowing effect — ranges aren't a
    /// first-class concept in the descriptor model, they only exist as a
    /// legacy wire shape (spec.md §3.2 Open Question, resolved in
    /// DESIGN.md).
    pub fn fold_range_to_group(id: impl Into<String>) -> Filter {
        Filter::Group(id.into(), Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingKind {
    Default,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    pub kind: ListingKind,
}

/// Wire tags 0-6, fixed by spec.md §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HomeComponentValue {
    ImageScroller,
    BigScroller,
    Scroller,
    MangaList { ranking: bool, page_size: Option<u32> },
    MangaChapterList { page_size: Option<u32> },
    Filters,
    Links,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeComponent {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub value: HomeComponentValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeLayout {
    pub components: Vec<HomeComponent>,
}

/// The image-response shape handed to `process_page_image` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub code: u16,
    pub headers: HashMap<String, String>,
    pub request_url: Option<String>,
    pub request_headers: HashMap<String, String>,
    pub image_rid: i32,
}

/// The decoded response of `get_search_manga_list` / `get_manga_list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MangaPageResult {
    pub entries: Vec<Manga>,
    pub has_next_page: bool,
}

/// The decoded response of `get_manga_update`: only the fields the caller
/// asked for (`needs_details`/`needs_chapters`) are populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MangaUpdate {
    pub manga: Option<Manga>,
    pub chapters: Option<Vec<Chapter>>,
}

/// The decoded response of modern-ABI `get_image_request`: a request shape
/// the host turns into an actual outbound request, rather than a resource
/// id the plugin already drove through `net.send` itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRequestResult {
    pub url: String,
    pub headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manga_stub_carries_defaults() {
        let m = Manga::stub("k1", "Title");
        assert_eq!(m.key, "k1");
        assert!(matches!(m.status, MangaStatus::Unknown));
        assert!(matches!(m.content_rating, ContentRating::Safe));
        assert_eq!(m.update_strategy, 0);
        assert!(m.next_update.is_none());
        assert!(m.chapters.is_none());
    }

    #[test]
    fn filter_value_id_covers_every_variant() {
        let values = vec![
            FilterValue::Text("a".into(), "q".into()),
            FilterValue::Sort("b".into(), 0, true),
            FilterValue::Check("c".into(), 1),
            FilterValue::Select("d".into(), "x".into()),
            FilterValue::MultiSelect("e".into(), vec![], vec![]),
            FilterValue::Range("f".into(), None, None),
        ];
        let ids: Vec<&str> = values.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn range_folds_to_empty_group() {
        let folded = FilterValue::fold_range_to_group("r1");
        match folded {
            Filter::Group(id, filters) => {
                assert_eq!(id, "r1");
                assert!(filters.is_empty());
            }
            _ => panic!("expected Group"),
        }
    }

    #[test]
    fn postcard_round_trips_manga() {
        let m = Manga::stub("k", "t");
        let bytes = postcard::to_allocvec(&m).unwrap();
        let back: Manga = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back.key, m.key);
    }
}
