//! Playlist permutation, weighted shuffle, and the per-source item cache
//!
//! **Why**: The viewer's slide index is an unbounded integer that only ever
//! counts forward. Mapping it through a playlist permutation plus an index
//! offset lets shuffle/unshuffle rebuild the order under the viewer's feet
//! without the current slide jumping or repeating.
//!
//! **Used by**: Shell (navigation, shuffle toggle), PlaybackScheduler
//! (item provider)
//!
//! # Weighted shuffle
//!
//! Each source carries a rating rank r and is repeated `2^(r-1)` times in
//! the shuffled order (rank 0 drops it). The order is built from
//! `num_seqs = 2^(max_rank-1)` sections: every source randomly occupies as
//! many distinct section slots as its repeat count, each section is
//! shuffled on its own, and the sections are concatenated. The currently
//! showing source is pulled out of section 0 and pinned to position 0
//! instead, so it never plays twice in a row across a reshuffle. With the
//! default rank of 1 everywhere this degenerates to a uniform permutation.

use std::sync::Arc;

use log::{debug, info};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::cache::EvictingCache;
use crate::item::ContentItem;
use crate::source::{ContentSource, dedup_sources};

/// Default capacity of the per-source item cache.
pub const DEFAULT_CACHE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum PlaylistError {
    /// Zero sources at construction, or a shuffle where every source has
    /// rank 0 and nothing is pinned.
    #[error("playlist is empty")]
    Empty,
}

/// Resume point: which source id should map to which logical index after
/// a rebuild. `Default` pins whatever ends up first to logical index 0.
#[derive(Debug, Clone, Default)]
pub struct StartAt {
    pub sid: Option<String>,
    pub index: i64,
}

impl StartAt {
    pub fn source(sid: impl Into<String>, index: i64) -> Self {
        Self { sid: Some(sid.into()), index }
    }
}

pub struct PlaylistManager {
    sources: Vec<Arc<dyn ContentSource>>,
    playlist: Vec<usize>,
    index_offset: i64,
    cache: EvictingCache<String, Arc<ContentItem>>,
}

impl PlaylistManager {
    /// Build a manager over a deduplicated copy of `sources`, in natural
    /// order, resuming at `start`. Zero sources are rejected here so the
    /// per-index path never has to answer for an empty playlist.
    pub fn new(
        sources: Vec<Arc<dyn ContentSource>>,
        start: &StartAt,
        cache_size: usize,
    ) -> Result<Self, PlaylistError> {
        if sources.is_empty() {
            return Err(PlaylistError::Empty);
        }
        let sources = dedup_sources(sources);
        let playlist: Vec<usize> = (0..sources.len()).collect();
        let cache = EvictingCache::new(
            cache_size,
            |sid: String, item: Arc<ContentItem>| {
                debug!("Releasing evicted item '{sid}'");
                item.release();
            },
        );
        let mut manager = Self { sources, playlist, index_offset: 0, cache };
        manager.index_offset = manager.natural_offset(start);
        info!(
            "Playlist ready: {} sources, cache capacity {}",
            manager.sources.len(),
            manager.cache.max()
        );
        Ok(manager)
    }

    pub fn sources(&self) -> &[Arc<dyn ContentSource>] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Current playback order as indices into [`sources`](Self::sources).
    pub fn playlist(&self) -> &[usize] {
        &self.playlist
    }

    /// Resolve a logical slide index (any integer) to its content item.
    ///
    /// The item comes from the LRU cache keyed by source id; a miss
    /// constructs and caches a fresh one, evicting (and releasing) the
    /// least-recently-shown item when past capacity.
    pub fn item_for_index(&mut self, logical: i64) -> Result<Arc<ContentItem>, PlaylistError> {
        if self.playlist.is_empty() {
            return Err(PlaylistError::Empty);
        }
        let len = self.playlist.len() as i64;
        let position = (logical + self.index_offset).rem_euclid(len) as usize;
        let source = Arc::clone(&self.sources[self.playlist[position]]);
        let sid = source.id().to_string();

        if let Some(item) = self.cache.get(&sid) {
            return Ok(Arc::clone(item));
        }
        let item = Arc::new(ContentItem::new(source));
        self.cache.set(sid, Arc::clone(&item));
        Ok(item)
    }

    /// Rebuild the playlist with the weighted stratified shuffle.
    ///
    /// `start.index` maps to position 0 of the new order; `start.sid`, if
    /// found, is pinned there.
    pub fn shuffle(&mut self, start: &StartAt) {
        let current = start
            .sid
            .as_deref()
            .and_then(|sid| self.position_of(sid));
        let ratings: Vec<u32> = self.sources.iter().map(|s| s.rating()).collect();
        self.playlist = build_shuffled(&ratings, current, &mut rand::rng());
        self.index_offset = -start.index;
        info!(
            "Shuffled: {} slots over {} sources",
            self.playlist.len(),
            self.sources.len()
        );
    }

    /// Restore natural source order, keeping `start.sid` at `start.index`.
    pub fn unshuffle(&mut self, start: &StartAt) {
        self.playlist = (0..self.sources.len()).collect();
        self.index_offset = self.natural_offset(start);
        debug!("Unshuffled: offset {}", self.index_offset);
    }

    /// Drop every cached item, releasing each through the eviction path.
    pub fn cleanup(&mut self) {
        self.cache.clear();
    }

    fn position_of(&self, sid: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.id() == sid)
    }

    /// Offset placing `start.sid` (or source 0 when absent) at
    /// `start.index` under the natural order.
    fn natural_offset(&self, start: &StartAt) -> i64 {
        let position = start
            .sid
            .as_deref()
            .and_then(|sid| self.position_of(sid))
            .unwrap_or(0) as i64;
        position - start.index
    }
}

fn rate_pow(rating: u32) -> usize {
    if rating == 0 { 0 } else { 1usize << (rating - 1).min(31) }
}

/// Weighted stratified shuffle over source indices.
///
/// `current`, when given, is excluded from section 0 and pinned to
/// position 0 of the result.
fn build_shuffled(ratings: &[u32], current: Option<usize>, rng: &mut impl Rng) -> Vec<usize> {
    if ratings.is_empty() {
        return Vec::new();
    }
    let max_rating = ratings.iter().copied().max().unwrap_or(0);
    let num_seqs = rate_pow(max_rating);

    // instances[source][section]: which section slots each source occupies
    let mut instances = vec![vec![false; num_seqs]; ratings.len()];
    for (source, &rating) in ratings.iter().enumerate() {
        let wanted = rate_pow(rating).min(num_seqs);
        for taken in 0..wanted {
            // pick the (target+1)-th still-unoccupied slot
            let target = rng.random_range(0..num_seqs - taken);
            let mut unoccupied = 0;
            for slot in instances[source].iter_mut() {
                if !*slot {
                    if unoccupied == target {
                        *slot = true;
                        break;
                    }
                    unoccupied += 1;
                }
            }
        }
    }

    // The current slide gets pinned to the front below; pulling it out of
    // section 0 keeps it from playing twice in a row.
    if let Some(current) = current
        && num_seqs > 0
    {
        instances[current][0] = false;
    }

    let mut playlist = Vec::new();
    if let Some(current) = current {
        playlist.push(current);
    }
    for section_index in 0..num_seqs {
        let mut section: Vec<usize> = (0..ratings.len())
            .filter(|&source| instances[source][section_index])
            .collect();
        section.shuffle(rng);
        playlist.extend(section);
    }
    playlist
}
