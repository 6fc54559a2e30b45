use crate::modules::backlog::adapters::outbound::repository::{MetricsQueries, RepositoryError};
use crate::modules::backlog::core::item::{ItemStatus, ItemType};
use crate::modules::backlog::core::metrics::{
    DEFAULT_AGEING_THRESHOLD_DAYS, MetricsSnapshot, StoryPointsProgress, TypeDistribution,
    health_status, iceberg_ratio, mean_over_types,
};
use std::sync::Arc;

/// Read-only statistics derived from the repository on demand.
pub struct MetricsAggregator {
    queries: Arc<dyn MetricsQueries>,
    window_days: u32,
    ageing_threshold_days: u32,
}

impl MetricsAggregator {
    pub fn new(queries: Arc<dyn MetricsQueries>, window_days: u32) -> Self {
        Self {
            queries,
            window_days,
            ageing_threshold_days: DEFAULT_AGEING_THRESHOLD_DAYS,
        }
    }

    /// Open items older than this many days count as ageing.
    pub fn with_ageing_threshold(mut self, days: u32) -> Self {
        self.ageing_threshold_days = days;
        self
    }

    pub async fn compute(&self, now_ms: i64) -> Result<MetricsSnapshot, RepositoryError> {
        let sizes = self.queries.backlog_size().await?;
        let count = |t: ItemType| sizes.get(&t).copied().unwrap_or(0);
        let (epic_count, feature_count, story_count) = (
            count(ItemType::Epic),
            count(ItemType::Feature),
            count(ItemType::Story),
        );
        let total_items = epic_count + feature_count + story_count;

        let ages = self
            .queries
            .average_age_by_type(ItemStatus::New, now_ms)
            .await?;
        let wip_count = self.queries.wip_count().await?;
        let lead_time_days = self
            .queries
            .lead_time_days(self.window_days, now_ms)
            .await?;
        let throughput = self.queries.throughput(self.window_days, now_ms).await?;
        let (blocked_count, average_blocked_days) = self.queries.blocked_items(now_ms).await?;
        let ageing_count = self
            .queries
            .ageing_items(self.ageing_threshold_days, now_ms)
            .await?;
        let (completed_points, total_points) = self
            .queries
            .story_points_in_window(self.window_days, now_ms)
            .await?;
        let type_counts = self.queries.type_counts().await?;

        Ok(MetricsSnapshot {
            total_items,
            epic_count,
            feature_count,
            story_count,
            average_age_days: mean_over_types(&ages),
            wip_count,
            lead_time_days,
            throughput,
            iceberg_ratio: iceberg_ratio(epic_count, feature_count, story_count),
            health_status: health_status(total_items, wip_count, lead_time_days),
            blocked_count,
            average_blocked_days,
            ageing_count,
            ageing_threshold_days: self.ageing_threshold_days,
            story_points: StoryPointsProgress::new(completed_points, total_points),
            type_distribution: TypeDistribution::from_counts(&type_counts),
            window_days: self.window_days,
            computed_at: now_ms,
        })
    }
}

#[cfg(test)]
mod metrics_aggregator_tests {
    use super::*;
    use crate::modules::backlog::adapters::outbound::repository::BacklogRepository;
    use crate::modules::backlog::adapters::outbound::repository_in_memory::InMemoryBacklogRepository;
    use crate::modules::backlog::core::item::BacklogItem;
    use crate::modules::backlog::core::metrics::HealthStatus;
    use crate::shared::core::primitives::MILLIS_PER_DAY;
    use rstest::rstest;

    async fn seed(repo: &InMemoryBacklogRepository, item_type: ItemType, n: usize, status: ItemStatus) {
        for i in 0..n {
            let mut item = BacklogItem::new(item_type, format!("{item_type} {i}"), None, 0).unwrap();
            item.status = status;
            repo.create(&item).await.unwrap();
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_score_an_even_backlog_as_a_perfect_iceberg() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        for item_type in ItemType::ALL {
            seed(&repo, item_type, 10, ItemStatus::New).await;
        }
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(10 * MILLIS_PER_DAY).await.unwrap();

        assert_eq!(snapshot.total_items, 30);
        assert!((snapshot.iceberg_ratio - 1.0).abs() < 1e-9);
        assert!((snapshot.average_age_days - 10.0).abs() < 1e-9);
        assert_eq!(snapshot.health_status, HealthStatus::Healthy);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_flag_a_large_backlog_at_risk() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Story, 160, ItemStatus::Ready).await;
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(0).await.unwrap();

        assert_eq!(snapshot.health_status, HealthStatus::AtRisk);
        assert_eq!(snapshot.average_age_days, 0.0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_warn_on_too_much_work_in_progress() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Story, 25, ItemStatus::InProgress).await;
        seed(&repo, ItemType::Feature, 25, ItemStatus::New).await;
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(0).await.unwrap();

        assert_eq!(snapshot.total_items, 50);
        assert_eq!(snapshot.wip_count, 25);
        assert_eq!(snapshot.health_status, HealthStatus::Warning);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_exclude_done_items_from_the_backlog_size() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Story, 3, ItemStatus::Done).await;
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(MILLIS_PER_DAY).await.unwrap();

        assert_eq!(snapshot.total_items, 0);
        assert_eq!(snapshot.iceberg_ratio, 0.0);
        assert_eq!(snapshot.throughput, 3);
        assert!((snapshot.lead_time_days - 0.0).abs() < 1e-9);
        assert_eq!(snapshot.window_days, 30);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_blocked_items_and_how_long_they_sat() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Story, 2, ItemStatus::Blocked).await;
        seed(&repo, ItemType::Story, 1, ItemStatus::Ready).await;
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(3 * MILLIS_PER_DAY).await.unwrap();

        assert_eq!(snapshot.blocked_count, 2);
        assert!((snapshot.average_blocked_days - 3.0).abs() < 1e-9);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_count_open_items_past_the_ageing_threshold() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Story, 2, ItemStatus::New).await;
        seed(&repo, ItemType::Story, 4, ItemStatus::Done).await;
        let aggregator = MetricsAggregator::new(repo.clone(), 30).with_ageing_threshold(7);

        let snapshot = aggregator.compute(8 * MILLIS_PER_DAY).await.unwrap();
        assert_eq!(snapshot.ageing_count, 2);
        assert_eq!(snapshot.ageing_threshold_days, 7);

        let default_threshold = MetricsAggregator::new(repo, 30);
        let snapshot = default_threshold.compute(8 * MILLIS_PER_DAY).await.unwrap();
        assert_eq!(snapshot.ageing_count, 0);
        assert_eq!(snapshot.ageing_threshold_days, DEFAULT_AGEING_THRESHOLD_DAYS);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_story_point_progress_in_the_window() {
        let repo = InMemoryBacklogRepository::new();
        for (points, status) in [(3, ItemStatus::Done), (5, ItemStatus::New), (2, ItemStatus::Done)] {
            let mut item = BacklogItem::new(ItemType::Story, "s", None, 0).unwrap();
            item.story_points = points;
            item.status = status;
            repo.create(&item).await.unwrap();
        }
        let aggregator = MetricsAggregator::new(Arc::new(repo), 30);

        let snapshot = aggregator.compute(MILLIS_PER_DAY).await.unwrap();

        assert_eq!(snapshot.story_points.completed, 5);
        assert_eq!(snapshot.story_points.total, 10);
        assert!((snapshot.story_points.completion_percentage - 50.0).abs() < 1e-9);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_include_done_items_in_the_type_distribution() {
        let repo = Arc::new(InMemoryBacklogRepository::new());
        seed(&repo, ItemType::Epic, 1, ItemStatus::Done).await;
        seed(&repo, ItemType::Feature, 1, ItemStatus::New).await;
        seed(&repo, ItemType::Story, 2, ItemStatus::New).await;
        let aggregator = MetricsAggregator::new(repo, 30);

        let snapshot = aggregator.compute(0).await.unwrap();

        assert_eq!(snapshot.epic_count, 0);
        assert!((snapshot.type_distribution.epic - 25.0).abs() < 1e-9);
        assert!((snapshot.type_distribution.feature - 25.0).abs() < 1e-9);
        assert!((snapshot.type_distribution.story - 50.0).abs() < 1e-9);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_if_the_repository_is_offline() {
        let mut repo = InMemoryBacklogRepository::new();
        repo.toggle_offline();
        let aggregator = MetricsAggregator::new(Arc::new(repo), 30);
        assert!(aggregator.compute(0).await.is_err());
    }
}
