//! Business logic services

pub mod lending;

use std::sync::Arc;

use crate::{config::LendingConfig, repository::Database};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub lending: lending::LendingCoordinator,
}

impl Services {
    /// Create all services over the given database
    pub fn new(db: Arc<dyn Database>, lending_config: &LendingConfig) -> Self {
        Self {
            lending: lending::LendingCoordinator::new(db, lending_config),
        }
    }
}
