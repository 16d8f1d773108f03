//! Server-side value containers backing the client's input widgets.
//!
//! A [`Widget`] is created by application code, placed into a container
//! during a render, and registered in the session's widget registry under
//! its key. Actions sent by the client update the registered widget before
//! the next render runs; render logic then reads [`WidgetHandle::changed`]
//! to react to the interaction.

pub mod mapper;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveTime};
use pagewire_protocol::{
    ButtonType, DateFormat, DateSeparator, IntOrFloat, LabelVisibility, SliderBounds,
    SliderValue, TextInputType,
};
use ulid::Ulid;

use crate::error::RequestError;

/// Prefix of every generated widget key.
pub const WIDGET_KEY_PREFIX: &str = "widget_";

// ============================================================================
// Values
// ============================================================================

/// The value held by a widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    /// Buttons and page links, and inputs the user has not filled in yet.
    None,
    Bool(bool),
    Index(i32),
    Indices(Vec<i32>),
    IndexRange(i32, i32),
    DateRange(Option<NaiveDate>, Option<NaiveDate>),
    Time(NaiveTime),
    Number(IntOrFloat),
    Text(String),
    Slider(SliderValue),
}

impl WidgetValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<i32> {
        match self {
            Self::Index(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_indices(&self) -> Option<&[i32]> {
        match self {
            Self::Indices(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<IntOrFloat> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_slider(&self) -> Option<&SliderValue> {
        match self {
            Self::Slider(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Kinds
// ============================================================================

/// The finite set of widget kinds, each with its own configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetKind {
    Button {
        button_type: ButtonType,
    },
    LinkButton {
        button_type: ButtonType,
        url: String,
    },
    PageLink {
        page: String,
        icon: Option<String>,
    },
    Checkbox,
    Toggle,
    Radio {
        options: Vec<String>,
        captions: Vec<String>,
        horizontal: bool,
    },
    Selectbox {
        options: Vec<String>,
        placeholder: Option<String>,
    },
    Multiselect {
        options: Vec<String>,
        placeholder: Option<String>,
    },
    SelectSlider {
        options: Vec<String>,
    },
    DateInput {
        min_date: Option<NaiveDate>,
        max_date: Option<NaiveDate>,
        today: bool,
        format: DateFormat,
        separator: DateSeparator,
    },
    TimeInput {
        step_seconds: u32,
    },
    NumberInput {
        min: Option<IntOrFloat>,
        max: Option<IntOrFloat>,
        step: Option<IntOrFloat>,
        format: Option<String>,
        placeholder: Option<String>,
    },
    TextInput {
        input_type: TextInputType,
        autocomplete: Option<String>,
        placeholder: Option<String>,
        max_chars: Option<u32>,
    },
    Slider {
        bounds: SliderBounds,
        format: Option<String>,
    },
}

impl WidgetKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Button { .. } => "button",
            Self::LinkButton { .. } => "link_button",
            Self::PageLink { .. } => "page_link",
            Self::Checkbox => "checkbox",
            Self::Toggle => "toggle",
            Self::Radio { .. } => "radio",
            Self::Selectbox { .. } => "selectbox",
            Self::Multiselect { .. } => "multiselect",
            Self::SelectSlider { .. } => "select_slider",
            Self::DateInput { .. } => "date_input",
            Self::TimeInput { .. } => "time_input",
            Self::NumberInput { .. } => "number_input",
            Self::TextInput { .. } => "text_input",
            Self::Slider { .. } => "slider",
        }
    }

    fn is_clickable(&self) -> bool {
        matches!(self, Self::Button { .. } | Self::LinkButton { .. })
    }

    pub(crate) fn supports_label_visibility(&self) -> bool {
        !matches!(
            self,
            Self::Button { .. } | Self::LinkButton { .. } | Self::PageLink { .. }
        )
    }

    pub(crate) fn supports_container_width(&self) -> bool {
        matches!(
            self,
            Self::Button { .. } | Self::LinkButton { .. } | Self::PageLink { .. }
        )
    }

    /// Link buttons and page links navigate client-side; no change callback fires.
    pub(crate) fn supports_change_callback(&self) -> bool {
        !matches!(self, Self::LinkButton { .. } | Self::PageLink { .. })
    }

    /// Whether `value` has the shape this kind stores.
    fn accepts(&self, value: &WidgetValue) -> bool {
        match (self, value) {
            (Self::Button { .. } | Self::LinkButton { .. } | Self::PageLink { .. }, v) => {
                *v == WidgetValue::None
            }
            (Self::Checkbox | Self::Toggle, WidgetValue::Bool(_)) => true,
            (Self::Radio { .. } | Self::Selectbox { .. }, WidgetValue::Index(_)) => true,
            (Self::Multiselect { .. }, WidgetValue::Indices(_)) => true,
            (Self::SelectSlider { .. }, WidgetValue::IndexRange(..)) => true,
            (Self::DateInput { .. }, WidgetValue::DateRange(..)) => true,
            (Self::TimeInput { .. }, WidgetValue::Time(_) | WidgetValue::None) => true,
            (Self::NumberInput { .. }, WidgetValue::Number(_) | WidgetValue::None) => true,
            (Self::TextInput { .. }, WidgetValue::Text(_)) => true,
            (Self::Slider { bounds, .. }, WidgetValue::Slider(v)) => slider_fits(bounds, v),
            _ => false,
        }
    }
}

fn slider_fits(bounds: &SliderBounds, value: &SliderValue) -> bool {
    matches!(
        (bounds, value),
        (
            SliderBounds::Int { .. },
            SliderValue::Int { .. } | SliderValue::IntRange { .. }
        ) | (
            SliderBounds::Float { .. },
            SliderValue::Float { .. } | SliderValue::FloatRange { .. }
        ) | (
            SliderBounds::Date { .. },
            SliderValue::Date { .. } | SliderValue::DateRange { .. }
        ) | (
            SliderBounds::Time { .. },
            SliderValue::Time { .. } | SliderValue::TimeRange { .. }
        )
    )
}

// ============================================================================
// Widget
// ============================================================================

/// Arguments handed to a change callback.
pub struct ChangeEvent<'a> {
    pub key: &'a str,
    pub args: &'a [String],
    pub kwargs: &'a HashMap<String, String>,
    pub previous: &'a WidgetValue,
    pub value: &'a WidgetValue,
}

pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent<'_>) + Send + Sync>;

pub struct Widget {
    key: String,
    label: String,
    help: Option<String>,
    disabled: bool,
    label_visibility: LabelVisibility,
    use_container_width: bool,
    kind: WidgetKind,
    value: WidgetValue,
    previous_value: WidgetValue,
    changed: bool,
    on_change: Option<ChangeCallback>,
}

impl Widget {
    /// Create a widget of any kind. Fails if `value` does not fit `kind`.
    pub fn new(
        label: impl Into<String>,
        kind: WidgetKind,
        value: WidgetValue,
    ) -> Result<Self, RequestError> {
        if !kind.accepts(&value) {
            return Err(RequestError::Widget(format!(
                "{} cannot hold {:?}",
                kind.name(),
                value
            )));
        }
        Ok(Self::of(label, kind, value))
    }

    // Shared by the typed constructors, whose initial values always fit.
    fn of(label: impl Into<String>, kind: WidgetKind, value: WidgetValue) -> Self {
        Self {
            key: format!("{}{}", WIDGET_KEY_PREFIX, Ulid::new().to_string().to_lowercase()),
            label: label.into(),
            help: None,
            disabled: false,
            label_visibility: LabelVisibility::Visible,
            use_container_width: false,
            previous_value: value.clone(),
            value,
            kind,
            changed: false,
            on_change: None,
        }
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    pub fn button(label: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::Button {
                button_type: ButtonType::Secondary,
            },
            WidgetValue::None,
        )
    }

    pub fn link_button(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::LinkButton {
                button_type: ButtonType::Secondary,
                url: url.into(),
            },
            WidgetValue::None,
        )
    }

    pub fn page_link(label: impl Into<String>, page: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::PageLink {
                page: page.into(),
                icon: None,
            },
            WidgetValue::None,
        )
    }

    pub fn checkbox(label: impl Into<String>) -> Self {
        Self::of(label, WidgetKind::Checkbox, WidgetValue::Bool(false))
    }

    pub fn toggle(label: impl Into<String>) -> Self {
        Self::of(label, WidgetKind::Toggle, WidgetValue::Bool(false))
    }

    pub fn radio(label: impl Into<String>, options: Vec<String>) -> Self {
        Self::of(
            label,
            WidgetKind::Radio {
                options,
                captions: Vec::new(),
                horizontal: false,
            },
            WidgetValue::Index(0),
        )
    }

    pub fn selectbox(label: impl Into<String>, options: Vec<String>) -> Self {
        Self::of(
            label,
            WidgetKind::Selectbox {
                options,
                placeholder: Some("Select an option".to_string()),
            },
            WidgetValue::Index(0),
        )
    }

    pub fn multiselect(label: impl Into<String>, options: Vec<String>) -> Self {
        Self::of(
            label,
            WidgetKind::Multiselect {
                options,
                placeholder: Some("Choose options".to_string()),
            },
            WidgetValue::Indices(Vec::new()),
        )
    }

    /// Upper index `-1` selects a single value rather than a range.
    pub fn select_slider(label: impl Into<String>, options: Vec<String>) -> Self {
        Self::of(
            label,
            WidgetKind::SelectSlider { options },
            WidgetValue::IndexRange(0, -1),
        )
    }

    pub fn date_input(label: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::DateInput {
                min_date: None,
                max_date: None,
                today: true,
                format: DateFormat::YearMonthDay,
                separator: DateSeparator::Slash,
            },
            WidgetValue::DateRange(None, None),
        )
    }

    pub fn time_input(label: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::TimeInput { step_seconds: 900 },
            WidgetValue::None,
        )
    }

    pub fn number_input(label: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::NumberInput {
                min: None,
                max: None,
                step: None,
                format: None,
                placeholder: None,
            },
            WidgetValue::None,
        )
    }

    pub fn text_input(label: impl Into<String>) -> Self {
        Self::of(
            label,
            WidgetKind::TextInput {
                input_type: TextInputType::Default,
                autocomplete: None,
                placeholder: None,
                max_chars: None,
            },
            WidgetValue::Text(String::new()),
        )
    }

    /// Integer slider starting at `min` with step 1.
    pub fn int_slider(label: impl Into<String>, min: i64, max: i64) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Int { min, max, step: 1 },
                format: None,
            },
            WidgetValue::Slider(SliderValue::Int { value: min }),
        )
    }

    /// Integer range slider spanning the full bounds.
    pub fn int_range_slider(label: impl Into<String>, min: i64, max: i64) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Int { min, max, step: 1 },
                format: None,
            },
            WidgetValue::Slider(SliderValue::IntRange { from: min, to: max }),
        )
    }

    /// Float slider starting at `min` with step 0.01.
    pub fn float_slider(label: impl Into<String>, min: f64, max: f64) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Float {
                    min,
                    max,
                    step: 0.01,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::Float { value: min }),
        )
    }

    pub fn float_range_slider(label: impl Into<String>, min: f64, max: f64) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Float {
                    min,
                    max,
                    step: 0.01,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::FloatRange { from: min, to: max }),
        )
    }

    /// Date slider with a one-day step.
    pub fn date_slider(label: impl Into<String>, min: NaiveDate, max: NaiveDate) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Date {
                    min,
                    max,
                    step_days: 1,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::Date { value: min }),
        )
    }

    pub fn date_range_slider(label: impl Into<String>, min: NaiveDate, max: NaiveDate) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Date {
                    min,
                    max,
                    step_days: 1,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::DateRange { from: min, to: max }),
        )
    }

    /// Time slider with a fifteen-minute step.
    pub fn time_slider(label: impl Into<String>, min: NaiveTime, max: NaiveTime) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Time {
                    min,
                    max,
                    step_seconds: 900,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::Time { value: min }),
        )
    }

    pub fn time_range_slider(label: impl Into<String>, min: NaiveTime, max: NaiveTime) -> Self {
        Self::of(
            label,
            WidgetKind::Slider {
                bounds: SliderBounds::Time {
                    min,
                    max,
                    step_seconds: 900,
                },
                format: None,
            },
            WidgetValue::Slider(SliderValue::TimeRange { from: min, to: max }),
        )
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub fn with_label_visibility(mut self, visibility: LabelVisibility) -> Self {
        self.label_visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_container_width(mut self, use_container_width: bool) -> Self {
        self.use_container_width = use_container_width;
        self
    }

    /// Register a callback fired when an action changes the value.
    #[must_use]
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn label_visibility(&self) -> LabelVisibility {
        self.label_visibility
    }

    pub fn use_container_width(&self) -> bool {
        self.use_container_width
    }

    pub fn kind(&self) -> &WidgetKind {
        &self.kind
    }

    /// Mutable access to the kind-specific configuration (options, bounds, ...).
    pub fn kind_mut(&mut self) -> &mut WidgetKind {
        &mut self.kind
    }

    pub fn value(&self) -> &WidgetValue {
        &self.value
    }

    pub fn previous_value(&self) -> &WidgetValue {
        &self.previous_value
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn change_callback(&self) -> Option<ChangeCallback> {
        if self.kind.supports_change_callback() {
            self.on_change.clone()
        } else {
            None
        }
    }

    // ------------------------------------------------------------------------
    // Value Updates
    // ------------------------------------------------------------------------

    /// Store a new value, returning whether it changed.
    ///
    /// Clicking a button always counts as a change. For every other kind
    /// the previous value is kept and `changed` is set only when the new
    /// value differs from the current one.
    pub fn set_value(&mut self, value: WidgetValue) -> Result<bool, RequestError> {
        if !self.kind.accepts(&value) {
            return Err(RequestError::Widget(format!(
                "{} '{}' cannot hold {:?}",
                self.kind.name(),
                self.key,
                value
            )));
        }

        if self.kind.is_clickable() {
            self.changed = true;
            return Ok(true);
        }

        if self.value == value {
            return Ok(false);
        }

        self.previous_value = std::mem::replace(&mut self.value, value);
        self.changed = true;
        Ok(true)
    }

    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    /// Option currently selected in a radio or selectbox.
    pub fn selected_option(&self) -> Option<&str> {
        let options = match &self.kind {
            WidgetKind::Radio { options, .. } | WidgetKind::Selectbox { options, .. } => options,
            _ => return None,
        };
        let index = usize::try_from(self.value.as_index()?).ok()?;
        options.get(index).map(String::as_str)
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("key", &self.key)
            .field("kind", &self.kind.name())
            .field("label", &self.label)
            .field("value", &self.value)
            .field("previous_value", &self.previous_value)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WidgetHandle
// ============================================================================

/// Shared handle to a widget, held by the application and the session registry.
///
/// std::sync::Mutex is correct here: the lock is never held across `.await`.
#[derive(Clone)]
pub struct WidgetHandle {
    key: Arc<str>,
    inner: Arc<Mutex<Widget>>,
}

impl WidgetHandle {
    pub fn new(widget: Widget) -> Self {
        Self {
            key: Arc::from(widget.key()),
            inner: Arc::new(Mutex::new(widget)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> WidgetValue {
        self.lock().value.clone()
    }

    pub fn previous_value(&self) -> WidgetValue {
        self.lock().previous_value.clone()
    }

    pub fn changed(&self) -> bool {
        self.lock().changed
    }

    pub fn selected_option(&self) -> Option<String> {
        self.lock().selected_option().map(str::to_string)
    }

    /// Run `f` with exclusive access to the widget.
    pub fn update<R>(&self, f: impl FnOnce(&mut Widget) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Widget> {
        // A panic while holding the lock leaves only plain data behind.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl From<Widget> for WidgetHandle {
    fn from(widget: Widget) -> Self {
        Self::new(widget)
    }
}

impl fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WidgetHandle").field(&self.key).finish()
    }
}
