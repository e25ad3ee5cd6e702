mod aggregator;
mod parser;

pub use aggregator::{build_catalog, PageFetcher};
pub use parser::{parse_page, ParsedPage};

/// One entry of the device's Now Playing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub size: u64,
    pub title: String,
    pub url: String,
    pub episode_title: Option<String>,
}

/// All recordings of a listing, sorted by title once built.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    recordings: Vec<Recording>,
}
impl Catalog {
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.iter().map(|x| x.size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    /// Recordings paired with their 1-based rank.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &Recording)> {
        self.recordings.iter().enumerate().map(|(i, x)| (i + 1, x))
    }

    fn extend(&mut self, recordings: Vec<Recording>) {
        self.recordings.extend(recordings);
    }

    /// `sort_by` is stable, so equal titles keep discovery order.
    fn sort(&mut self) {
        self.recordings.sort_by(|a, b| a.title.cmp(&b.title));
    }
}

impl From<Vec<Recording>> for Catalog {
    fn from(recordings: Vec<Recording>) -> Self {
        let mut catalog = Self { recordings };
        catalog.sort();
        catalog
    }
}
