// Listing filter shared by every repository adapter.
//
// Semantics
// - types / statuses: item matches any of the listed values (empty = all).
// - tags: every requested tag must be present.
// - search: case-insensitive substring of title or description.
// - Default order is priority ascending; ties break on created_at then id.

use crate::modules::backlog::core::item::{BacklogItem, ItemStatus, ItemType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Priority,
    CreatedAt,
    UpdatedAt,
    Title,
    StoryPoints,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemFilter {
    #[serde(default)]
    pub types: BTreeSet<ItemType>,
    #[serde(default)]
    pub statuses: BTreeSet<ItemStatus>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl ItemFilter {
    /// Trims text fields and drops blanks so equivalent filters compare equal.
    pub fn normalized(mut self) -> Self {
        self.tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.assignee = self
            .assignee
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn matches(&self, item: &BacklogItem) -> bool {
        if !self.types.is_empty() && !self.types.contains(&item.item_type) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&item.status) {
            return false;
        }
        if !self.tags.iter().all(|t| item.tags.contains(t)) {
            return false;
        }
        if let Some(parent_id) = self.parent_id {
            if item.parent_id != Some(parent_id) {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if item.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = item.title.to_lowercase().contains(&needle);
            let in_description = item
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }

    /// Searched listings have an unbounded key space and are never cached.
    pub fn is_cacheable(&self) -> bool {
        self.search.as_deref().is_none_or(|s| s.trim().is_empty())
    }

    /// Stable hash of the normalised filter, used in `list:<fingerprint>` keys.
    pub fn fingerprint(&self) -> String {
        let normalized = self.clone().normalized();
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Applies offset and limit to an already filtered and sorted list.
    pub fn paginate(&self, items: Vec<BacklogItem>) -> Vec<BacklogItem> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

pub fn sort_items(items: &mut [BacklogItem], key: SortKey, direction: SortDirection) {
    items.sort_by(|a, b| {
        let primary = match key {
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::StoryPoints => a.story_points.cmp(&b.story_points),
        };
        let primary = match direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        match primary {
            Ordering::Equal => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
            other => other,
        }
    });
}

/// Filters, sorts and paginates; returns the page and the unpaginated total.
pub fn apply_filter(
    items: impl IntoIterator<Item = BacklogItem>,
    filter: &ItemFilter,
) -> (Vec<BacklogItem>, usize) {
    let mut matching: Vec<BacklogItem> = items.into_iter().filter(|i| filter.matches(i)).collect();
    let total = matching.len();
    sort_items(&mut matching, filter.sort, filter.direction);
    (filter.paginate(matching), total)
}

#[cfg(test)]
mod item_filter_tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn item(item_type: ItemType, title: &str, priority: i32, tags: &[&str]) -> BacklogItem {
        let mut item = BacklogItem::new(item_type, title, None, 0).unwrap();
        item.priority = priority;
        item.replace_tags(tags.iter().copied());
        item
    }

    #[fixture]
    fn items() -> Vec<BacklogItem> {
        vec![
            item(ItemType::Epic, "Payments", 3, &["finance"]),
            item(ItemType::Feature, "Card checkout", 1, &["finance", "ui"]),
            item(ItemType::Story, "Refund button", 2, &["ui"]),
        ]
    }

    #[rstest]
    fn it_should_require_every_requested_tag(items: Vec<BacklogItem>) {
        let filter = ItemFilter {
            tags: ["finance".to_string(), "ui".to_string()].into(),
            ..Default::default()
        };
        let (page, total) = apply_filter(items, &filter);
        assert_eq!(total, 1);
        assert_eq!(page[0].title, "Card checkout");
    }

    #[rstest]
    fn it_should_search_title_and_description_case_insensitively(mut items: Vec<BacklogItem>) {
        items[0].description = Some("Everything about REFUNDS".into());
        let filter = ItemFilter {
            search: Some("refund".into()),
            ..Default::default()
        };
        let (page, total) = apply_filter(items, &filter);
        assert_eq!(total, 2);
        assert_eq!(page[0].title, "Refund button");
        assert_eq!(page[1].title, "Payments");
    }

    #[rstest]
    fn it_should_sort_by_priority_ascending_by_default(items: Vec<BacklogItem>) {
        let (page, _) = apply_filter(items, &ItemFilter::default());
        let priorities: Vec<i32> = page.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[rstest]
    fn it_should_sort_descending_when_asked(items: Vec<BacklogItem>) {
        let filter = ItemFilter {
            sort: SortKey::Title,
            direction: SortDirection::Desc,
            ..Default::default()
        };
        let (page, _) = apply_filter(items, &filter);
        assert_eq!(page[0].title, "Refund button");
    }

    #[rstest]
    fn it_should_report_the_total_before_pagination(items: Vec<BacklogItem>) {
        let filter = ItemFilter {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        };
        let (page, total) = apply_filter(items, &filter);
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].priority, 2);
    }

    #[rstest]
    fn it_should_match_types_and_statuses_as_sets(items: Vec<BacklogItem>) {
        let filter = ItemFilter {
            types: [ItemType::Epic, ItemType::Story].into(),
            statuses: [ItemStatus::New].into(),
            ..Default::default()
        };
        let (_, total) = apply_filter(items, &filter);
        assert_eq!(total, 2);
    }

    #[rstest]
    fn it_should_fingerprint_equivalent_filters_identically() {
        let a = ItemFilter {
            tags: ["ui".to_string(), "finance".to_string()].into(),
            assignee: Some(" ada ".into()),
            ..Default::default()
        };
        let b = ItemFilter {
            tags: ["finance".to_string(), " ui".to_string()].into(),
            assignee: Some("ada".into()),
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = ItemFilter {
            offset: 10,
            ..b
        };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[rstest]
    fn it_should_not_cache_searched_listings() {
        let filter = ItemFilter {
            search: Some("x".into()),
            ..Default::default()
        };
        assert!(!filter.is_cacheable());
        assert!(ItemFilter::default().is_cacheable());
    }
}
