use crate::modules::backlog::core::filter::ItemFilter;
use std::time::Duration;
use uuid::Uuid;

pub const ITEM_TTL: Duration = Duration::from_secs(60 * 60);
pub const LIST_TTL: Duration = Duration::from_secs(5 * 60);
pub const CHILDREN_TTL: Duration = Duration::from_secs(5 * 60);
pub const METRICS_TTL: Duration = Duration::from_secs(60 * 60);

pub const METRICS_KEY: &str = "metrics";
pub const LIST_PREFIX: &str = "list:";
pub const CHILDREN_PREFIX: &str = "children:";

pub fn item_key(id: Uuid) -> String {
    format!("item:{id}")
}

pub fn children_key(parent_id: Uuid) -> String {
    format!("{CHILDREN_PREFIX}{parent_id}")
}

pub fn list_key(filter: &ItemFilter) -> String {
    format!("{LIST_PREFIX}{}", filter.fingerprint())
}

#[cfg(test)]
mod cache_keys_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_build_scoped_keys() {
        let id = Uuid::nil();
        assert_eq!(item_key(id), format!("item:{id}"));
        assert_eq!(children_key(id), format!("children:{id}"));
        assert!(list_key(&ItemFilter::default()).starts_with(LIST_PREFIX));
    }
}
