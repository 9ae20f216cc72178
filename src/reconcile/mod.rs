//! POI reconciliation engine.
//!
//! Merges the approved and draft collections into one id-keyed working set
//! and exposes the presentation filters that operate on it.

pub mod policy;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::geometry::{find_overlapping, Camera, MapFrame, Point};
use crate::models::Poi;

/// Merge the two sources. On an id present in both, the draft copy wins.
pub fn reconcile(approved: Vec<Poi>, draft: Vec<Poi>) -> WorkingSet {
    let mut pois = HashMap::with_capacity(approved.len() + draft.len());

    for mut poi in approved {
        poi.approved = true;
        pois.insert(poi.id.clone(), poi);
    }

    for mut poi in draft {
        poi.approved = false;
        if pois.insert(poi.id.clone(), poi).is_some() {
            tracing::debug!("Draft copy overrides approved record");
        }
    }

    WorkingSet {
        pois,
        ..WorkingSet::default()
    }
}

/// Which POI types are drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Every type except these.
    Hide(BTreeSet<String>),
    /// Only these types.
    Show(BTreeSet<String>),
}

impl Default for TypeFilter {
    fn default() -> Self {
        TypeFilter::Hide(BTreeSet::new())
    }
}

impl TypeFilter {
    pub fn only(kind: &str) -> Self {
        TypeFilter::Show(BTreeSet::from([kind.to_string()]))
    }

    pub fn shows(&self, kind: &str) -> bool {
        match self {
            TypeFilter::Hide(hidden) => !hidden.contains(kind),
            TypeFilter::Show(shown) => shown.contains(kind),
        }
    }

    pub fn set(&mut self, kind: &str, visible: bool) {
        match self {
            TypeFilter::Hide(hidden) if visible => {
                hidden.remove(kind);
            }
            TypeFilter::Hide(hidden) => {
                hidden.insert(kind.to_string());
            }
            TypeFilter::Show(shown) if visible => {
                shown.insert(kind.to_string());
            }
            TypeFilter::Show(shown) => {
                shown.remove(kind);
            }
        }
    }
}

/// The authoritative in-memory set of POIs.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    pois: HashMap<String, Poi>,
    type_filter: TypeFilter,
    /// Ids whose last push to the store failed.
    stale: HashSet<String>,
}

/// A set rebuilt from a saved snapshot keeps each record's approval flag.
impl FromIterator<Poi> for WorkingSet {
    fn from_iter<I: IntoIterator<Item = Poi>>(iter: I) -> Self {
        WorkingSet {
            pois: iter.into_iter().map(|poi| (poi.id.clone(), poi)).collect(),
            ..WorkingSet::default()
        }
    }
}

impl WorkingSet {
    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Poi> {
        self.pois.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Poi> {
        self.pois.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pois.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values()
    }

    pub fn visible(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values().filter(|p| p.visible)
    }

    pub fn insert(&mut self, poi: Poi) -> Option<Poi> {
        self.pois.insert(poi.id.clone(), poi)
    }

    pub fn remove(&mut self, id: &str) -> Option<Poi> {
        self.pois.remove(id)
    }

    /// Show or hide every POI of one type. Returns how many POIs matched.
    pub fn set_group_visible(&mut self, kind: &str, visible: bool) -> usize {
        self.type_filter.set(kind, visible);

        let mut matched = 0;
        for poi in self.pois.values_mut().filter(|p| p.kind == kind) {
            poi.visible = visible;
            matched += 1;
        }
        matched
    }

    /// Show exactly one type. Types that appear later stay hidden until
    /// shown explicitly.
    pub fn set_only_visible(&mut self, kind: &str) -> usize {
        self.type_filter = TypeFilter::only(kind);

        let mut shown = 0;
        for poi in self.pois.values_mut() {
            poi.visible = poi.kind == kind;
            if poi.visible {
                shown += 1;
            }
        }
        shown
    }

    /// Flip one POI's visibility; `None` when the id is unknown.
    pub fn toggle_visible(&mut self, id: &str) -> Option<bool> {
        let poi = self.pois.get_mut(id)?;
        poi.visible = !poi.visible;
        Some(poi.visible)
    }

    pub fn type_filter(&self) -> &TypeFilter {
        &self.type_filter
    }

    /// Re-apply a type filter, e.g. after a refresh replaced the set.
    pub fn apply_type_filter(&mut self, filter: TypeFilter) {
        for poi in self.pois.values_mut() {
            poi.visible = filter.shows(&poi.kind);
        }
        self.type_filter = filter;
    }

    pub fn mark_stale(&mut self, id: &str) {
        self.stale.insert(id.to_string());
    }

    pub fn clear_stale(&mut self, id: &str) {
        self.stale.remove(id);
    }

    pub fn needs_resync(&self, id: &str) -> bool {
        self.stale.contains(id)
    }

    pub fn stale_ids(&self) -> impl Iterator<Item = &str> {
        self.stale.iter().map(String::as_str)
    }

    /// Deterministic draw order: oldest first, the selected POI last so it
    /// renders on top.
    pub fn render_order(&self, selected: Option<&str>) -> Vec<&Poi> {
        let mut ordered: Vec<&Poi> = self.pois.values().collect();
        ordered.sort_by(|a, b| {
            let a_selected = Some(a.id.as_str()) == selected;
            let b_selected = Some(b.id.as_str()) == selected;
            a_selected
                .cmp(&b_selected)
                .then_with(|| a.date_added.cmp(&b.date_added))
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    /// Owned copy in render order without a selection.
    pub fn snapshot(&self) -> Vec<Poi> {
        self.render_order(None).into_iter().cloned().collect()
    }

    /// Visible POIs stacked under a screen point, in render order.
    pub fn overlapping(
        &self,
        point: Point,
        camera: &Camera,
        frame: &MapFrame,
        threshold: f64,
    ) -> Vec<&Poi> {
        let visible = self.render_order(None).into_iter().filter(|p| p.visible);
        find_overlapping(point, visible, camera, frame, threshold)
    }
}

/// Next POI to select when clicking repeatedly on a stack of pins.
pub fn cycle_selection(stack: &[&Poi], selected: Option<&str>) -> Option<String> {
    if stack.is_empty() {
        return None;
    }
    let next = match selected.and_then(|id| stack.iter().position(|p| p.id == id)) {
        Some(index) => (index + 1) % stack.len(),
        None => 0,
    };
    Some(stack[next].id.clone())
}
