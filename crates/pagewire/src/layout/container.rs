//! Containers and the operations they emit.
//!
//! A [`Container`] pairs a node of the per-request tree with the operations
//! context that owns it. Every emitting call checks cancellation first and
//! then pushes exactly one operation onto the context's queue, so calls made
//! from render logic stream out in program order.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use pagewire_protocol::{ColumnGap, Operation, VerticalAlignment};
use rand::Rng;
use tracing::debug;

use crate::error::RequestError;
use crate::request::OperationsContext;
use crate::widget::{WidgetHandle, mapper};

pub const ROOT_KEY: &str = "root";
pub const SIDEBAR_KEY: &str = "sidebar";

/// Tolerance for float rounding in column width sums.
const WIDTH_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerKind {
    Root,
    Sidebar,
    Inner {
        height: i32,
        border: bool,
    },
    Expandable {
        label: Option<String>,
        icon: Option<String>,
        expanded: bool,
    },
    Tab {
        name: String,
    },
    Column {
        index: usize,
        width: f32,
    },
    Placeholder,
}

/// Optional decorations for text elements. Fields a given element does not
/// support are ignored.
#[derive(Debug, Clone, Default)]
pub struct TextOptions {
    pub anchor: Option<String>,
    pub help: Option<String>,
    pub divider: bool,
    pub unsafe_allow_html: bool,
}

impl TextOptions {
    pub fn help(help: impl Into<String>) -> Self {
        Self {
            help: Some(help.into()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

/// A node of the container tree. Children are recorded by key.
pub struct ContainerNode {
    key: String,
    kind: ContainerKind,
    parent: Option<Arc<ContainerNode>>,
    children: Mutex<Vec<String>>,
}

impl ContainerNode {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self::detached(ROOT_KEY.to_string(), ContainerKind::Root))
    }

    pub(crate) fn sidebar() -> Arc<Self> {
        Arc::new(Self::detached(SIDEBAR_KEY.to_string(), ContainerKind::Sidebar))
    }

    fn detached(key: String, kind: ContainerKind) -> Self {
        Self {
            key,
            kind,
            parent: None,
            children: Mutex::new(Vec::new()),
        }
    }

    fn child(parent: &Arc<Self>, key: String, kind: ContainerKind) -> Arc<Self> {
        lock(&parent.children).push(key.clone());
        Arc::new(Self {
            key,
            kind,
            parent: Some(parent.clone()),
            children: Mutex::new(Vec::new()),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<&Arc<ContainerNode>> {
        self.parent.as_ref()
    }

    /// Keys of the direct children, in creation order.
    pub fn children(&self) -> Vec<String> {
        lock(&self.children).clone()
    }

    /// True if this node or any ancestor matches `pred`.
    fn lineage_any(&self, pred: impl Fn(&ContainerKind) -> bool) -> bool {
        let mut node = Some(self);
        while let Some(current) = node {
            if pred(&current.kind) {
                return true;
            }
            node = current.parent.as_deref();
        }
        false
    }
}

impl fmt::Debug for ContainerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerNode")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.key.as_str()))
            .field("children", &self.children())
            .finish()
    }
}

// ============================================================================
// Container
// ============================================================================

#[derive(Clone)]
pub struct Container {
    node: Arc<ContainerNode>,
    ctx: Arc<OperationsContext>,
}

impl Container {
    pub(crate) fn new(node: Arc<ContainerNode>, ctx: Arc<OperationsContext>) -> Self {
        Self { node, ctx }
    }

    pub fn key(&self) -> &str {
        &self.node.key
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.node.kind
    }

    pub fn node(&self) -> &Arc<ContainerNode> {
        &self.node
    }

    pub fn parent(&self) -> Option<Container> {
        self.node
            .parent
            .as_ref()
            .map(|parent| Container::new(parent.clone(), self.ctx.clone()))
    }

    pub fn children(&self) -> Vec<String> {
        self.node.children()
    }

    pub fn context(&self) -> &Arc<OperationsContext> {
        &self.ctx
    }

    // ------------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------------

    pub fn title(&self, body: impl Into<String>) -> Result<&Self, RequestError> {
        self.title_with(body, TextOptions::default())
    }

    pub fn title_with(
        &self,
        body: impl Into<String>,
        options: TextOptions,
    ) -> Result<&Self, RequestError> {
        self.emit(Operation::Title {
            container: self.key().to_string(),
            body: body.into(),
            anchor: options.anchor,
            help: options.help,
        })?;
        Ok(self)
    }

    pub fn header(&self, body: impl Into<String>) -> Result<&Self, RequestError> {
        self.header_with(body, TextOptions::default())
    }

    pub fn header_with(
        &self,
        body: impl Into<String>,
        options: TextOptions,
    ) -> Result<&Self, RequestError> {
        self.emit(Operation::Header {
            container: self.key().to_string(),
            body: body.into(),
            anchor: options.anchor,
            help: options.help,
            divider: options.divider,
        })?;
        Ok(self)
    }

    pub fn subheader(&self, body: impl Into<String>) -> Result<&Self, RequestError> {
        self.subheader_with(body, TextOptions::default())
    }

    pub fn subheader_with(
        &self,
        body: impl Into<String>,
        options: TextOptions,
    ) -> Result<&Self, RequestError> {
        self.emit(Operation::Subheader {
            container: self.key().to_string(),
            body: body.into(),
            anchor: options.anchor,
            help: options.help,
            divider: options.divider,
        })?;
        Ok(self)
    }

    pub fn text(&self, body: impl Into<String>) -> Result<&Self, RequestError> {
        self.text_with(body, TextOptions::default())
    }

    pub fn text_with(
        &self,
        body: impl Into<String>,
        options: TextOptions,
    ) -> Result<&Self, RequestError> {
        self.emit(Operation::Text {
            container: self.key().to_string(),
            body: body.into(),
            help: options.help,
        })?;
        Ok(self)
    }

    pub fn markdown(&self, body: impl Into<String>) -> Result<&Self, RequestError> {
        self.markdown_with(body, TextOptions::default())
    }

    pub fn markdown_with(
        &self,
        body: impl Into<String>,
        options: TextOptions,
    ) -> Result<&Self, RequestError> {
        self.emit(Operation::Markdown {
            container: self.key().to_string(),
            body: body.into(),
            unsafe_allow_html: options.unsafe_allow_html,
            help: options.help,
        })?;
        Ok(self)
    }

    /// Write text incrementally from `chunks` on a background task.
    ///
    /// The first chunk names this container; the last one is flagged
    /// `is_last`. Render returns immediately; the request waits for the
    /// stream before it ends.
    pub fn write_stream<S>(&self, chunks: S) -> Result<(), RequestError>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        self.ctx.check_cancelled()?;

        let container = self.key().to_string();
        let stream_key = self.unique_key(|suffix| format!("{container}(stream_{suffix})"));
        let ctx = self.ctx.clone();

        self.ctx.execute(async move {
            let mut chunks = Box::pin(chunks.peekable());
            let mut first = true;
            while let Some(body) = chunks.next().await {
                let is_last = chunks.as_mut().peek().await.is_none();
                ctx.enqueue(Operation::WriteStreamChunk {
                    container: first.then(|| container.clone()),
                    key: stream_key.clone(),
                    body,
                    is_last,
                })?;
                first = false;
            }
            debug!(stream = %stream_key, "Finished writing stream");
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    pub fn switch_page(&self, page: impl Into<String>) -> Result<(), RequestError> {
        self.emit(Operation::SwitchPage { page: page.into() })
    }

    pub fn rerun(&self) -> Result<(), RequestError> {
        self.emit(Operation::Rerun)
    }

    pub fn stop(&self, message: Option<String>) -> Result<(), RequestError> {
        self.emit(Operation::Stop { message })
    }

    // ------------------------------------------------------------------------
    // Nested containers
    // ------------------------------------------------------------------------

    /// A plain nested container. `height <= 0` means automatic height.
    pub fn inner_container(&self, height: i32, border: bool) -> Result<Container, RequestError> {
        self.ctx.check_cancelled()?;

        let child = self.spawn_child(
            self.unique_key(|suffix| format!("inner_{suffix}")),
            ContainerKind::Inner { height, border },
        );
        self.emit(Operation::InnerContainer {
            parent: self.key().to_string(),
            key: child.key().to_string(),
            height,
            border,
        })?;
        Ok(child)
    }

    pub fn expander(
        &self,
        label: Option<&str>,
        icon: Option<&str>,
        expanded: bool,
    ) -> Result<Container, RequestError> {
        self.ctx.check_cancelled()?;
        if self
            .node
            .lineage_any(|kind| matches!(kind, ContainerKind::Expandable { .. }))
        {
            return Err(RequestError::Structure(
                "expander cannot be nested inside another expander".to_string(),
            ));
        }

        let label = label.map(str::to_string);
        let icon = icon.map(str::to_string);
        let child = self.spawn_child(
            self.unique_key(|suffix| format!("expandable_{suffix}")),
            ContainerKind::Expandable {
                label: label.clone(),
                icon: icon.clone(),
                expanded,
            },
        );
        self.emit(Operation::ExpandableContainer {
            parent: self.key().to_string(),
            key: child.key().to_string(),
            label,
            icon,
            expanded,
        })?;
        Ok(child)
    }

    /// One container per tab, in the order of `names`.
    pub fn tabs(&self, names: &[&str]) -> Result<Vec<Container>, RequestError> {
        if names.is_empty() {
            return Err(RequestError::Structure(
                "number of tabs must be greater than 0".to_string(),
            ));
        }
        if names.iter().any(|name| name.is_empty()) {
            return Err(RequestError::Structure(
                "tab name cannot be empty".to_string(),
            ));
        }
        self.ctx.check_cancelled()?;

        let tabs: Vec<Container> = names
            .iter()
            .map(|name| {
                self.spawn_child(
                    self.unique_key(|suffix| format!("tab_{suffix}({name})")),
                    ContainerKind::Tab {
                        name: name.to_string(),
                    },
                )
            })
            .collect();

        self.emit(Operation::TabContainers {
            parent: self.key().to_string(),
            keys: tabs.iter().map(|t| t.key().to_string()).collect(),
            tabs: names.iter().map(|n| n.to_string()).collect(),
        })?;
        Ok(tabs)
    }

    /// Side-by-side columns. Each width is a fraction of the row; the
    /// widths may sum to at most 1.0.
    pub fn columns(
        &self,
        widths: &[f32],
        gap: ColumnGap,
        vertical_alignment: VerticalAlignment,
    ) -> Result<Vec<Container>, RequestError> {
        if widths.is_empty() {
            return Err(RequestError::Structure(
                "number of columns must be greater than 0".to_string(),
            ));
        }
        if widths.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RequestError::Structure(format!(
                "column widths must be non-negative, got {widths:?}"
            )));
        }
        let sum: f32 = widths.iter().sum();
        if sum > 1.0 + WIDTH_EPSILON {
            return Err(RequestError::Structure(format!(
                "sum of column widths must be <= 1.0, got {sum}"
            )));
        }
        self.ctx.check_cancelled()?;
        if self
            .node
            .lineage_any(|kind| matches!(kind, ContainerKind::Column { .. }))
        {
            return Err(RequestError::Structure(
                "columns cannot be nested inside another column".to_string(),
            ));
        }

        let columns: Vec<Container> = widths
            .iter()
            .enumerate()
            .map(|(index, width)| {
                self.spawn_child(
                    self.unique_key(|suffix| format!("column_{suffix}({index})")),
                    ContainerKind::Column {
                        index,
                        width: *width,
                    },
                )
            })
            .collect();

        self.emit(Operation::ColumnContainers {
            parent: self.key().to_string(),
            keys: columns.iter().map(|c| c.key().to_string()).collect(),
            widths: widths.to_vec(),
            gap,
            vertical_alignment,
        })?;
        Ok(columns)
    }

    /// A single-element container whose content can be replaced.
    ///
    /// Called on a direct child of a placeholder, this empties that
    /// placeholder and returns `self` instead of creating a new one.
    pub fn placeholder(&self) -> Result<Container, RequestError> {
        self.ctx.check_cancelled()?;

        if let Some(parent) = self.node.parent.as_ref()
            && parent.kind == ContainerKind::Placeholder
        {
            self.emit(Operation::PlaceholderContainer {
                parent: None,
                key: parent.key.clone(),
                empty: true,
            })?;
            return Ok(self.clone());
        }

        let child = self.spawn_child(
            self.unique_key(|suffix| format!("placeholder_{suffix}")),
            ContainerKind::Placeholder,
        );
        self.emit(Operation::PlaceholderContainer {
            parent: Some(self.key().to_string()),
            key: child.key().to_string(),
            empty: false,
        })?;
        Ok(child)
    }

    /// Clear the content of this placeholder.
    pub fn empty(&self) -> Result<(), RequestError> {
        if self.node.kind != ContainerKind::Placeholder {
            return Err(RequestError::Structure(format!(
                "container '{}' is not a placeholder",
                self.key()
            )));
        }
        self.emit(Operation::PlaceholderContainer {
            parent: None,
            key: self.key().to_string(),
            empty: true,
        })
    }

    // ------------------------------------------------------------------------
    // Widgets
    // ------------------------------------------------------------------------

    /// Place a widget in this container and register it with the session so
    /// later actions can address it.
    pub fn widget(&self, widget: &WidgetHandle) -> Result<&Self, RequestError> {
        self.ctx.check_cancelled()?;

        let op = {
            let guard = widget.lock();
            mapper::to_operation(&guard, self.key())?
        };
        self.ctx.session().register_widget(widget.clone());
        self.emit(op)?;
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn emit(&self, op: Operation) -> Result<(), RequestError> {
        self.ctx.check_cancelled()?;
        debug!(
            session_id = %self.ctx.request().session_id(),
            seq = self.ctx.seq(),
            container = %self.node.key,
            ?op,
            "Queuing operation"
        );
        self.ctx.enqueue(op)
    }

    /// A key built from a random suffix, unique within this request.
    fn unique_key(&self, make: impl Fn(&str) -> String) -> String {
        self.ctx.claim_key(|| make(&random_suffix()))
    }

    fn spawn_child(&self, key: String, kind: ContainerKind) -> Container {
        Container::new(ContainerNode::child(&self.node, key, kind), self.ctx.clone())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("key", &self.node.key)
            .field("kind", &self.node.kind)
            .finish()
    }
}

/// Six random decimal digits.
fn random_suffix() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
