//! Built-in demo application served by `pagewire serve`.
//!
//! Three pages exercising text, layout, widgets, and streamed output. Each
//! session gets its own widgets so actions from one client never touch
//! another's state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pagewire_protocol::{ColumnGap, VerticalAlignment};

use crate::app::{App, AppManager, MultiPageApp, Page};
use crate::error::RequestError;
use crate::layout::TextOptions;
use crate::menu::{NavigationEntry, NavigationMenu};
use crate::request::OperationsContext;
use crate::session::SessionState;
use crate::widget::{Widget, WidgetHandle};

const STREAM_CHUNK_DELAY: Duration = Duration::from_millis(40);

/// App manager creating one demo app per session.
pub fn app_manager() -> Arc<dyn AppManager> {
    Arc::new(
        |_session: &Arc<SessionState>| -> Result<Arc<dyn App>, RequestError> {
            Ok(Arc::new(demo_app()?))
        },
    )
}

/// A fresh demo app with its own widgets.
pub fn demo_app() -> Result<MultiPageApp, RequestError> {
    let menu = NavigationMenu::sidebar(vec![
        NavigationEntry::new("home", "Home")?
            .with_icon(":material/home:")
            .as_default(),
        NavigationEntry::new("stream", "Streaming")?.with_icon(":material/stream:"),
        NavigationEntry::new("about", "About")?,
    ])?;

    Ok(MultiPageApp::new()
        .page(HomePage::new())
        .page(StreamPage::new())
        .page(AboutPage::new())
        .with_menu(menu))
}

// ============================================================================
// Home
// ============================================================================

struct HomePage {
    name: WidgetHandle,
    flavor: WidgetHandle,
    subscribed: WidgetHandle,
    refresh: WidgetHandle,
}

impl HomePage {
    fn new() -> Self {
        let flavors = ["vanilla", "chocolate", "pistachio"].map(str::to_string).to_vec();
        Self {
            name: Widget::text_input("Your name")
                .with_help("Used in the greeting below")
                .into(),
            flavor: Widget::selectbox("Favorite flavor", flavors).into(),
            subscribed: Widget::toggle("Subscribe to updates").into(),
            refresh: Widget::button("Refresh").into(),
        }
    }
}

#[async_trait]
impl Page for HomePage {
    fn name(&self) -> &str {
        "home"
    }

    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
        let root = ctx.root();
        root.title("Pagewire demo")?
            .widget(&self.name)?;

        let name = self.name.value();
        let name = name.as_text().map(str::trim).filter(|n| !n.is_empty());
        root.text(format!("Hello, {}!", name.unwrap_or("stranger")))?;

        let columns = root.columns(&[0.5, 0.5], ColumnGap::Medium, VerticalAlignment::Center)?;
        columns[0].widget(&self.flavor)?;
        columns[1].widget(&self.subscribed)?;

        if let Some(flavor) = self.flavor.selected_option() {
            root.markdown(format!("You picked **{flavor}**."))?;
        }
        if self.subscribed.changed() && self.subscribed.value().as_bool() == Some(true) {
            root.subheader_with("Thanks for subscribing", TextOptions::help("Toggle off any time"))?;
        }

        root.widget(&self.refresh)?;
        if self.refresh.changed() {
            root.rerun()?;
        }
        Ok(())
    }
}

// ============================================================================
// Streaming
// ============================================================================

struct StreamPage {
    prompt: WidgetHandle,
}

impl StreamPage {
    fn new() -> Self {
        Self {
            prompt: Widget::text_input("Text to stream").into(),
        }
    }
}

#[async_trait]
impl Page for StreamPage {
    fn name(&self) -> &str {
        "stream"
    }

    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
        let root = ctx.root();
        root.header("Streaming output")?.widget(&self.prompt)?;

        let text = self.prompt.value();
        let text = match text.as_text() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => "Type something above and watch it arrive word by word.".to_string(),
        };

        let words: Vec<String> = text.split_whitespace().map(|w| format!("{w} ")).collect();
        let chunks = futures::stream::iter(words).then(|word| async move {
            tokio::time::sleep(STREAM_CHUNK_DELAY).await;
            word
        });

        let output = root.placeholder()?;
        output.write_stream(chunks)?;
        Ok(())
    }
}

// ============================================================================
// About
// ============================================================================

struct AboutPage {
    home_link: WidgetHandle,
}

impl AboutPage {
    fn new() -> Self {
        Self {
            home_link: Widget::page_link("Back home", "home").into(),
        }
    }
}

#[async_trait]
impl Page for AboutPage {
    fn name(&self) -> &str {
        "about"
    }

    async fn render(&self, ctx: Arc<OperationsContext>) -> Result<(), RequestError> {
        let root = ctx.root();
        root.header("About")?.markdown(
            "Pages are rendered on the server; the client only draws the \
             operations it receives.",
        )?;

        let details = root.expander(Some("Session"), Some(":material/info:"), false)?;
        let session = ctx.session();
        details.text(format!("Session id: {}", session.session_id()))?;
        details.text(format!("Registered widgets: {}", session.widget_count()))?;

        ctx.sidebar().widget(&self.home_link)?;
        Ok(())
    }
}
