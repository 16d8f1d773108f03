//! Wire types exchanged between a pagewire server and its remote UI client.
//!
//! # Protocol Overview
//!
//! The client drives a server-side application with two request kinds:
//!
//! - **Operations** (client → server, [`OperationsRequest`]): render the current
//!   page; the server answers with an ordered stream of [`Operation`]s ending
//!   in exactly one [`Operation::End`].
//! - **Navigation** (client → server, [`NavigationRequest`]): resolve the
//!   navigation menu; the server answers with one [`NavigationResponse`].
//!
//! Both carry a per-session sequence number and the user interactions
//! ([`Action`]s) collected since the previous request.
//!
//! All enums are internally tagged JSON with a snake_case `type` field.
//!
//! ```ignore
//! use pagewire_protocol::Operation;
//!
//! let op: Operation = serde_json::from_str(r#"{"type":"rerun"}"#)?;
//! assert!(matches!(op, Operation::Rerun));
//! ```

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// Requests (Client → Server)
// ============================================================================

/// Request to render the application and stream back operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationsRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub seq: u64,
    /// Page to render. Blank or missing means the default page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Request to resolve the application's navigation menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub seq: u64,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Liveness probe for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub session_id: String,
}

/// Answer to [`PingRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongResponse {
    pub session_id: String,
}

// ============================================================================
// Actions (Client → Server)
// ============================================================================

/// A user interaction with a widget, collected client-side since the last
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Key of the widget the interaction targets.
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub kwargs: HashMap<String, String>,
    #[serde(flatten)]
    pub payload: ActionPayload,
}

impl Action {
    /// Create an action with no callback arguments.
    pub fn new(key: impl Into<String>, payload: ActionPayload) -> Self {
        Self {
            key: key.into(),
            args: Vec::new(),
            kwargs: HashMap::new(),
            payload,
        }
    }
}

/// The typed value carried by an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    Button,
    Checkbox {
        value: bool,
    },
    Toggle {
        value: bool,
    },
    Radio {
        index: i32,
    },
    Selectbox {
        index: i32,
    },
    Multiselect {
        #[serde(default)]
        selected_indices: Vec<i32>,
    },
    SelectSlider {
        lower_index: i32,
        upper_index: i32,
    },
    /// Either bound may be omitted, in which case the current one is kept.
    DateInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_date: Option<NaiveDate>,
    },
    TimeInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<NaiveTime>,
    },
    NumberInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<IntOrFloat>,
    },
    TextInput {
        value: String,
    },
    Slider {
        value: SliderValue,
    },
}

impl ActionPayload {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Checkbox { .. } => "checkbox",
            Self::Toggle { .. } => "toggle",
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
}

// ============================================================================
// Shared Values
// ============================================================================

/// A number that keeps track of whether it was integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrFloat {
    Int(i64),
    Float(f64),
}

impl From<i64> for IntOrFloat {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for IntOrFloat {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Current value of a slider, single or range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SliderValue {
    Int { value: i64 },
    Float { value: f64 },
    Date { value: NaiveDate },
    Time { value: NaiveTime },
    IntRange { from: i64, to: i64 },
    FloatRange { from: f64, to: f64 },
    DateRange { from: NaiveDate, to: NaiveDate },
    TimeRange { from: NaiveTime, to: NaiveTime },
}

/// Bounds and step of a slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SliderBounds {
    Int { min: i64, max: i64, step: i64 },
    Float { min: f64, max: f64, step: f64 },
    Date { min: NaiveDate, max: NaiveDate, step_days: i64 },
    Time { min: NaiveTime, max: NaiveTime, step_seconds: i64 },
}

// ============================================================================
// Operations (Server → Client)
// ============================================================================

/// One UI mutation produced while rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Title {
        container: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
    Header {
        container: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help: Option<String>,
        #[serde(default)]
        divider: bool,
    },
    Subheader {
        container: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help: Option<String>,
        #[serde(default)]
        divider: bool,
    },
    Text {
        container: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
    Markdown {
        container: String,
        body: String,
        #[serde(default)]
        unsafe_allow_html: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
    /// One chunk of incrementally written text. Only the first chunk of a
    /// stream names its container.
    WriteStreamChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
        key: String,
        body: String,
        #[serde(default)]
        is_last: bool,
    },
    SwitchPage {
        page: String,
    },
    Rerun,
    Stop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    InnerContainer {
        parent: String,
        key: String,
        /// Zero or negative means automatic height.
        height: i32,
        border: bool,
    },
    ExpandableContainer {
        parent: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        expanded: bool,
    },
    TabContainers {
        parent: String,
        keys: Vec<String>,
        tabs: Vec<String>,
    },
    ColumnContainers {
        parent: String,
        keys: Vec<String>,
        widths: Vec<f32>,
        gap: ColumnGap,
        vertical_alignment: VerticalAlignment,
    },
    /// Creates a placeholder, or clears an existing one when `empty` is set.
    PlaceholderContainer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        key: String,
        #[serde(default)]
        empty: bool,
    },
    Button(ButtonOp),
    PageLink(PageLinkOp),
    Checkbox(CheckboxOp),
    Toggle(ToggleOp),
    Radio(RadioOp),
    Selectbox(SelectboxOp),
    Multiselect(MultiselectOp),
    SelectSlider(SelectSliderOp),
    DateInput(DateInputOp),
    TimeInput(TimeInputOp),
    NumberInput(NumberInputOp),
    TextInput(TextInputOp),
    Slider(SliderOp),
    /// Terminal sentinel of an operations stream.
    End {
        terminate_session: bool,
        cancelled: bool,
    },
}

impl Operation {
    /// Create an [`Operation::End`].
    pub fn end(terminate_session: bool, cancelled: bool) -> Self {
        Self::End {
            terminate_session,
            cancelled,
        }
    }

    /// Whether this is the terminal [`Operation::End`].
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnGap {
    #[default]
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

// ============================================================================
// Widget Operations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelVisibility {
    #[default]
    Visible,
    Hidden,
    Collapsed,
}

/// Properties common to every widget operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetProps {
    pub container: String,
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_visibility: Option<LabelVisibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_container_width: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonType {
    Primary,
    #[default]
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonOp {
    pub props: WidgetProps,
    pub button_type: ButtonType,
    /// Set for link buttons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLinkOp {
    pub props: WidgetProps,
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxOp {
    pub props: WidgetProps,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOp {
    pub props: WidgetProps,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioOp {
    pub props: WidgetProps,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captions: Vec<String>,
    pub index: i32,
    #[serde(default)]
    pub horizontal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectboxOp {
    pub props: WidgetProps,
    pub options: Vec<String>,
    pub index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiselectOp {
    pub props: WidgetProps,
    pub options: Vec<String>,
    pub selected_indices: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectSliderOp {
    pub props: WidgetProps,
    pub options: Vec<String>,
    pub lower_index: i32,
    pub upper_index: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    #[default]
    YearMonthDay,
    DayMonthYear,
    MonthDayYear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSeparator {
    #[default]
    Slash,
    Dash,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateInputOp {
    pub props: WidgetProps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<NaiveDate>,
    /// Let the client default to today's date.
    pub today: bool,
    pub date_format: DateFormat,
    pub date_separator: DateSeparator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeInputOp {
    pub props: WidgetProps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<NaiveTime>,
    pub step_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberInputOp {
    pub props: WidgetProps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<IntOrFloat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<IntOrFloat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<IntOrFloat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<IntOrFloat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputType {
    #[default]
    Default,
    Password,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextInputOp {
    pub props: WidgetProps,
    pub input_type: TextInputType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderOp {
    pub props: WidgetProps,
    pub bounds: SliderBounds,
    pub value: SliderValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

// ============================================================================
// Navigation (Server → Client)
// ============================================================================

/// Answer to a [`NavigationRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationResponse {
    /// `None` when the application has no navigation menu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    /// Set when a newer navigation request superseded this one.
    #[serde(default)]
    pub cancelled: bool,
}

impl NavigationResponse {
    pub fn cancelled() -> Self {
        Self {
            navigation: None,
            cancelled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub location: MenuLocation,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuLocation {
    #[default]
    Sidebar,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub entries: Vec<NavigationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    pub page: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}
