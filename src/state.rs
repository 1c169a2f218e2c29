use std::sync::Arc;

use crate::clock::Clock;
use crate::config::PortalConfig;
use crate::mirror::LiveList;
use crate::models::{Announcement, Course, Material};
use crate::services::{Announcements, Courses, Materials, Users};
use crate::store::DocumentStore;

// Live lists backing the public read routes
pub struct Feeds {
    pub announcements: LiveList<Announcement>,
    pub important: LiveList<Announcement>,
    pub courses: LiveList<Course>,
    pub materials: LiveList<Material>,
}

impl Feeds {
    fn spawn(store: &Arc<dyn DocumentStore>, config: &PortalConfig) -> Self {
        Self {
            announcements: LiveList::spawn(
                Arc::clone(store),
                Announcements::recent_query(config.announcement_limit),
                "announcements",
            ),
            important: LiveList::spawn(
                Arc::clone(store),
                Announcements::important_query(config.important_limit),
                "important_announcements",
            ),
            courses: LiveList::spawn(
                Arc::clone(store),
                Courses::published_query(config.course_limit),
                "published_courses",
            ),
            materials: LiveList::spawn(
                Arc::clone(store),
                Materials::recent_query(config.material_limit),
                "materials",
            ),
        }
    }
}

// app's shared state
pub struct AppState {
    pub announcements: Announcements,
    pub courses: Courses,
    pub materials: Materials,
    pub users: Users,
    pub feeds: Feeds,
    pub config: PortalConfig,
}

impl AppState {
    /// Build the services and start the live feeds. Needs a tokio runtime.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: PortalConfig) -> Self {
        Self {
            announcements: Announcements::new(Arc::clone(&store), Arc::clone(&clock)),
            courses: Courses::new(Arc::clone(&store), Arc::clone(&clock), config.course_quota),
            materials: Materials::new(Arc::clone(&store), Arc::clone(&clock)),
            users: Users::new(Arc::clone(&store), clock),
            feeds: Feeds::spawn(&store, &config),
            config,
        }
    }
}
