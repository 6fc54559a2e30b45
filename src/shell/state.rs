use crate::modules::backlog::application::service::BacklogService;
use crate::shared::infrastructure::message_bus::relay::DeliveryReports;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BacklogService>,
    pub reports: Arc<DeliveryReports>,
}
