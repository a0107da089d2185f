use crate::config::Config;
use crate::render::Renderer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub renderer: Renderer,
}

impl AppState {
    pub fn new(config: Config, renderer: Renderer) -> Self {
        Self {
            config: Arc::new(config),
            renderer,
        }
    }
}
