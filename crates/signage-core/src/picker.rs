//! Content picker: folder navigation, search and sort over one fetched page.

use std::cmp::Ordering;
use std::str::FromStr;

use uuid::Uuid;

use signage_types::api::Crumb;
use signage_types::models::{Content, ContentFolder};

pub const DEFAULT_DURATION_SECS: u32 = 10;
pub const MIN_DURATION_SECS: u32 = 3;
pub const MAX_DURATION_SECS: u32 = 120;

/// Clamp a requested display duration to the accepted range.
pub fn clamp_duration(seconds: u32) -> u32 {
    seconds.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    NameAsc,
    NameDesc,
    DateDesc,
    TypeAsc,
}

impl FromStr for SortKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name-asc" => Ok(Self::NameAsc),
            "name-desc" => Ok(Self::NameDesc),
            "date-desc" => Ok(Self::DateDesc),
            "type-asc" => Ok(Self::TypeAsc),
            _ => Err(()),
        }
    }
}

/// Breadcrumb from root to the current folder. Empty means root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breadcrumb {
    path: Vec<Crumb>,
}

impl Breadcrumb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a breadcrumb from an ancestor chain ordered root first.
    pub fn from_ancestors<'a, I>(ancestors: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentFolder>,
    {
        let mut crumb = Self::new();
        for folder in ancestors {
            crumb.open_folder(folder.id, &folder.name);
        }
        crumb
    }

    pub fn current(&self) -> Option<Uuid> {
        self.path.last().map(|c| c.id)
    }

    pub fn path(&self) -> &[Crumb] {
        &self.path
    }

    pub fn into_path(self) -> Vec<Crumb> {
        self.path
    }

    pub fn open_root(&mut self) {
        self.path.clear();
    }

    pub fn open_folder(&mut self, id: Uuid, name: &str) {
        self.path.push(Crumb {
            id,
            name: name.to_string(),
        });
    }

    /// Jump to the crumb at `index`. Negative or out-of-range indices go to root.
    pub fn go_to(&mut self, index: isize) {
        if index < 0 || index as usize >= self.path.len() {
            self.open_root();
            return;
        }
        self.path.truncate(index as usize + 1);
    }
}

fn by_lower(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Apply search and sort to a freshly fetched page of folders and contents.
pub fn filter_and_sort(
    mut folders: Vec<ContentFolder>,
    mut contents: Vec<Content>,
    search: &str,
    sort: Option<SortKey>,
) -> (Vec<ContentFolder>, Vec<Content>) {
    let needle = search.trim().to_lowercase();
    if !needle.is_empty() {
        folders.retain(|f| f.name.to_lowercase().contains(&needle));
        contents.retain(|c| c.name.to_lowercase().contains(&needle));
    }

    match sort {
        Some(SortKey::NameAsc) => {
            folders.sort_by(|a, b| by_lower(&a.name, &b.name));
            contents.sort_by(|a, b| by_lower(&a.name, &b.name));
        }
        Some(SortKey::NameDesc) => {
            folders.sort_by(|a, b| by_lower(&b.name, &a.name));
            contents.sort_by(|a, b| by_lower(&b.name, &a.name));
        }
        Some(SortKey::DateDesc) => {
            contents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Some(SortKey::TypeAsc) => {
            contents.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));
        }
        None => {}
    }

    (folders, contents)
}
