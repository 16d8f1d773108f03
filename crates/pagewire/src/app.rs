//! Application traits and the per-session app cache.
//!
//! An [`App`] is the user code a session drives: it renders pages into an
//! [`OperationsContext`] and optionally serves a navigation menu. An
//! [`AppManager`] hands out one app per session and is told when a session
//! goes away.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::RequestError;
use crate::menu::NavigationMenu;
use crate::request::{NavigationContext, OperationsContext};
use crate::session::SessionState;

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait App: Send + Sync {
    /// Render the page named by `ctx.page_name()`. Called once per
    /// operations request.
    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError>;

    /// The navigation menu, if the app has one.
    async fn navigation_menu(
        &self,
        _ctx: &NavigationContext,
    ) -> Result<Option<NavigationMenu>, RequestError> {
        Ok(None)
    }

    /// Release resources held by the app. Called when its session ends.
    async fn close(&self) {}
}

#[async_trait]
pub trait AppManager: Send + Sync {
    /// The app for `session`, created on first use.
    async fn get_or_create_app(
        &self,
        session: &Arc<SessionState>,
    ) -> Result<Arc<dyn App>, RequestError>;

    /// Called after a session has been evicted.
    async fn dispose_session(&self, _session_id: &str) {}
}

/// Any `Fn(&Arc<SessionState>) -> Result<Arc<dyn App>, _>` is an app factory.
#[async_trait]
impl<F> AppManager for F
where
    F: Fn(&Arc<SessionState>) -> Result<Arc<dyn App>, RequestError> + Send + Sync,
{
    async fn get_or_create_app(
        &self,
        session: &Arc<SessionState>,
    ) -> Result<Arc<dyn App>, RequestError> {
        self(session)
    }
}

// ============================================================================
// App Cache
// ============================================================================

/// Caches one app per session id on top of another manager.
pub struct AppCache {
    inner: Arc<dyn AppManager>,
    apps: DashMap<String, Arc<dyn App>>,
}

impl AppCache {
    pub fn new(inner: Arc<dyn AppManager>) -> Self {
        Self {
            inner,
            apps: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Drop a cached app without closing it.
    pub fn remove(&self, session_id: &str) -> Option<Arc<dyn App>> {
        self.apps.remove(session_id).map(|(_, app)| app)
    }

    /// Close every cached app and empty the cache.
    pub async fn clear(&self) {
        let apps: Vec<(String, Arc<dyn App>)> = self
            .apps
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.apps.clear();

        info!(count = apps.len(), "Disposing all apps");
        for (session_id, app) in apps {
            app.close().await;
            debug!(session_id = %session_id, "App closed");
        }
    }
}

#[async_trait]
impl AppManager for AppCache {
    async fn get_or_create_app(
        &self,
        session: &Arc<SessionState>,
    ) -> Result<Arc<dyn App>, RequestError> {
        if let Some(app) = self.apps.get(session.session_id()) {
            return Ok(app.value().clone());
        }

        // Created outside the map so no shard lock is held across await.
        let created = self.inner.get_or_create_app(session).await?;
        let cached = self
            .apps
            .entry(session.session_id().to_string())
            .or_insert_with(|| created.clone())
            .value()
            .clone();

        if !Arc::ptr_eq(&cached, &created) {
            // Lost a race with a concurrent first request.
            created.close().await;
        }
        Ok(cached)
    }

    async fn dispose_session(&self, session_id: &str) {
        debug!(session_id = %session_id, "Disposing app for session");
        if let Some((_, app)) = self.apps.remove(session_id) {
            app.close().await;
            info!(session_id = %session_id, "App instance closed");
        }
        self.inner.dispose_session(session_id).await;
    }
}

// ============================================================================
// Multi-page Apps
// ============================================================================

#[async_trait]
pub trait Page: Send + Sync {
    /// Unique internal name the client uses to address the page.
    fn name(&self) -> &str;

    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError>;
}

/// An app that routes each render to the page named by the request.
///
/// Requests for the `"default"` page go to the configured default page,
/// else to the menu's default entry, else to the first page added.
#[derive(Default)]
pub struct MultiPageApp {
    pages: HashMap<String, Arc<dyn Page>>,
    first_page: Option<String>,
    default_page: Option<String>,
    menu: Option<NavigationMenu>,
}

const DEFAULT_PAGE: &str = "default";

impl MultiPageApp {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: impl Page + 'static) -> Self {
        let name = page.name().to_string();
        self.first_page.get_or_insert_with(|| name.clone());
        self.pages.insert(name, Arc::new(page));
        self
    }

    #[must_use]
    pub fn with_default_page(mut self, name: impl Into<String>) -> Self {
        self.default_page = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_menu(mut self, menu: NavigationMenu) -> Self {
        self.menu = Some(menu);
        self
    }

    /// Look up a page by name, resolving `"default"`.
    pub fn get_page(&self, name: &str) -> Result<&Arc<dyn Page>, RequestError> {
        if let Some(page) = self.pages.get(name) {
            return Ok(page);
        }

        if name == DEFAULT_PAGE {
            let fallback = self
                .default_page
                .as_deref()
                .or_else(|| self.menu.as_ref().and_then(|m| m.default_page()))
                .or(self.first_page.as_deref());
            if let Some(page) = fallback.and_then(|n| self.pages.get(n)) {
                return Ok(page);
            }
        }

        Err(RequestError::app(format!("unknown page '{name}'")))
    }
}

#[async_trait]
impl App for MultiPageApp {
    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
        let page = self.get_page(ctx.page_name())?.clone();
        debug!(page = %page.name(), "Rendering page");
        page.render(ctx).await
    }

    async fn navigation_menu(
        &self,
        _ctx: &NavigationContext,
    ) -> Result<Option<NavigationMenu>, RequestError> {
        Ok(self.menu.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::menu::NavigationEntry;

    struct CountingApp {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl App for CountingApp {
        async fn render(&self, _ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingManager {
        created: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AppManager for CountingManager {
        async fn get_or_create_app(
            &self,
            _session: &Arc<SessionState>,
        ) -> Result<Arc<dyn App>, RequestError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingApp {
                closed: self.closed.clone(),
            }))
        }
    }

    struct NamedPage(&'static str);

    #[async_trait]
    impl Page for NamedPage {
        fn name(&self) -> &str {
            self.0
        }

        async fn render(&self, _ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
            Ok(())
        }
    }

    fn counting_cache() -> (AppCache, Arc<CountingManager>) {
        let manager = Arc::new(CountingManager {
            created: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        });
        (AppCache::new(manager.clone()), manager)
    }

    #[tokio::test]
    async fn test_cache_returns_same_app_per_session() {
        let (cache, manager) = counting_cache();
        let s1 = Arc::new(SessionState::new("s1".to_string(), None));
        let s2 = Arc::new(SessionState::new("s2".to_string(), None));

        let a = cache.get_or_create_app(&s1).await.unwrap();
        let b = cache.get_or_create_app(&s1).await.unwrap();
        cache.get_or_create_app(&s2).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.created.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_closes_app() {
        let (cache, manager) = counting_cache();
        let s1 = Arc::new(SessionState::new("s1".to_string(), None));
        cache.get_or_create_app(&s1).await.unwrap();

        cache.dispose_session("s1").await;
        cache.dispose_session("s1").await;
        assert!(cache.is_empty());
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_closes_all() {
        let (cache, manager) = counting_cache();
        for id in ["a", "b", "c"] {
            let session = Arc::new(SessionState::new(id.to_string(), None));
            cache.get_or_create_app(&session).await.unwrap();
        }

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(manager.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_closure_is_app_manager() {
        let factory = |_: &Arc<SessionState>| -> Result<Arc<dyn App>, RequestError> {
            Ok(Arc::new(MultiPageApp::new().page(NamedPage("home"))))
        };
        let cache = AppCache::new(Arc::new(factory));
        let session = Arc::new(SessionState::new("s1".to_string(), None));
        assert!(cache.get_or_create_app(&session).await.is_ok());
    }

    #[test]
    fn test_default_page_resolution() {
        let app = MultiPageApp::new()
            .page(NamedPage("home"))
            .page(NamedPage("about"));
        assert_eq!(app.get_page("default").unwrap().name(), "home");
        assert_eq!(app.get_page("about").unwrap().name(), "about");

        let menu = NavigationMenu::sidebar(vec![
            NavigationEntry::new("home", "Home").unwrap(),
            NavigationEntry::new("about", "About").unwrap().as_default(),
        ])
        .unwrap();
        let app = app.with_menu(menu);
        assert_eq!(app.get_page("default").unwrap().name(), "about");

        let app = app.with_default_page("home");
        assert_eq!(app.get_page("default").unwrap().name(), "home");
    }

    #[test]
    fn test_unknown_page_is_an_error() {
        let app = MultiPageApp::new().page(NamedPage("home"));
        assert!(matches!(app.get_page("missing"), Err(RequestError::App(_))));
    }
}
