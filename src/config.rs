use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::rate_limit::DEFAULT_QUOTA;
use crate::services::{announcements, courses, materials};
use crate::store::{DocumentStore, MemoryStore, RestStore};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "portal-gateway")]
#[command(about = "Rate-limited gateway and live feeds for the department portal")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Document store: "memory" or the base url of the hosted store
    // Example: "https://store.example.edu"
    #[arg(short, long, default_value = "memory")]
    pub store: String,

    // Courses each author may post per calendar month
    #[arg(long, default_value_t = DEFAULT_QUOTA)]
    pub course_quota: u32,

    // Poll interval in seconds for hosted store subscriptions
    #[arg(long, default_value_t = 5)]
    pub poll_interval: u64,

    // Feed sizes
    #[arg(long, default_value_t = 10)]
    pub announcement_limit: usize,

    #[arg(long, default_value_t = 5)]
    pub important_limit: usize,

    #[arg(long, default_value_t = 10)]
    pub course_limit: usize,

    #[arg(long, default_value_t = 5)]
    pub material_limit: usize,

    // Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn uses_memory_store(&self) -> bool {
        self.store == "memory"
    }

    pub fn build_store(&self) -> Arc<dyn DocumentStore> {
        if self.uses_memory_store() {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(RestStore::new(&self.store, self.poll_interval()))
        }
    }

    pub fn portal(&self) -> PortalConfig {
        PortalConfig {
            course_quota: self.course_quota,
            announcement_limit: self.announcement_limit,
            important_limit: self.important_limit,
            course_limit: self.course_limit,
            material_limit: self.material_limit,
        }
    }
}

/// Settings the portal services and feeds are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalConfig {
    pub course_quota: u32,
    pub announcement_limit: usize,
    pub important_limit: usize,
    pub course_limit: usize,
    pub material_limit: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            course_quota: DEFAULT_QUOTA,
            announcement_limit: announcements::RECENT_LIMIT,
            important_limit: announcements::IMPORTANT_LIMIT,
            course_limit: courses::PUBLISHED_LIMIT,
            material_limit: materials::RECENT_LIMIT,
        }
    }
}
