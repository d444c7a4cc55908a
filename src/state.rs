use crate::config::Config;
use crate::lifecycle::LifecycleEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub config: Arc<Config>,
}
