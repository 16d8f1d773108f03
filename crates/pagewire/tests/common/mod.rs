//! Common test utilities.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use futures::future::BoxFuture;

use pagewire::app::{App, AppCache, AppManager};
use pagewire::dispatcher::Dispatcher;
use pagewire::error::RequestError;
use pagewire::menu::NavigationMenu;
use pagewire::protocol::{Action, NavigationRequest, OperationsRequest};
use pagewire::request::{NavigationContext, OperationsContext};
use pagewire::server::{self, AppState};
use pagewire::session::{SessionRegistry, SessionState};

type RenderFn =
    Arc<dyn Fn(Arc<OperationsContext>) -> BoxFuture<'static, Result<(), RequestError>> + Send + Sync>;

/// An app whose render is a test closure, optionally with a menu.
pub struct ScriptedApp {
    render: RenderFn,
    menu: Option<NavigationMenu>,
}

impl ScriptedApp {
    pub fn new<F, Fut>(render: F) -> Self
    where
        F: Fn(Arc<OperationsContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RequestError>> + Send + 'static,
    {
        Self {
            render: Arc::new(move |ctx| -> BoxFuture<'static, Result<(), RequestError>> {
                Box::pin(render(ctx))
            }),
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: NavigationMenu) -> Self {
        self.menu = Some(menu);
        self
    }
}

#[async_trait]
impl App for ScriptedApp {
    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
        (self.render)(ctx).await
    }

    async fn navigation_menu(
        &self,
        _ctx: &NavigationContext,
    ) -> Result<Option<NavigationMenu>, RequestError> {
        Ok(self.menu.clone())
    }
}

/// Hands the same app to every session.
pub struct SharedApp(pub Arc<dyn App>);

#[async_trait]
impl AppManager for SharedApp {
    async fn get_or_create_app(
        &self,
        _session: &Arc<SessionState>,
    ) -> Result<Arc<dyn App>, RequestError> {
        Ok(self.0.clone())
    }
}

pub fn dispatcher_for(app: impl App + 'static) -> Dispatcher {
    Dispatcher::new(SessionRegistry::new(), Arc::new(SharedApp(Arc::new(app))))
}

pub fn ops_request(session_id: &str, seq: u64) -> OperationsRequest {
    OperationsRequest {
        session_id: session_id.to_string(),
        app_name: None,
        seq,
        page: None,
        actions: Vec::new(),
    }
}

pub fn ops_request_with(session_id: &str, seq: u64, actions: Vec<Action>) -> OperationsRequest {
    OperationsRequest {
        actions,
        ..ops_request(session_id, seq)
    }
}

pub fn nav_request(session_id: &str, seq: u64) -> NavigationRequest {
    NavigationRequest {
        session_id: session_id.to_string(),
        app_name: None,
        seq,
        actions: Vec::new(),
    }
}

/// Create a test `AppState` around `app`.
pub fn test_app_state(app: impl App + 'static) -> AppState {
    let apps = Arc::new(AppCache::new(Arc::new(SharedApp(Arc::new(app)))));
    AppState {
        dispatcher: Dispatcher::new(SessionRegistry::new(), apps.clone()),
        apps,
        keep_alive_interval_seconds: 15,
        max_connections: 64,
    }
}

/// Create a test router serving a title-and-text app.
pub fn test_app() -> Router {
    server::build_app(test_app_state(hello_app()), 300)
}

/// Renders `title("Hello")` then `text("World")`.
pub fn hello_app() -> ScriptedApp {
    ScriptedApp::new(|ctx| async move {
        let root = ctx.root();
        root.title("Hello")?.text("World")?;
        Ok(())
    })
}
