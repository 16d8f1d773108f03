//! Pure mapping from widgets to their wire operations.

use pagewire_protocol::{
    ButtonOp, CheckboxOp, DateInputOp, MultiselectOp, NumberInputOp, Operation, PageLinkOp,
    RadioOp, SelectSliderOp, SelectboxOp, SliderOp, TextInputOp, TimeInputOp, ToggleOp,
    WidgetProps,
};

use super::{Widget, WidgetKind, WidgetValue};
use crate::error::RequestError;

/// Build the operation that places `widget` into the container `container_key`.
pub fn to_operation(widget: &Widget, container_key: &str) -> Result<Operation, RequestError> {
    let props = widget_props(widget, container_key);
    let value = widget.value();

    let op = match widget.kind() {
        WidgetKind::Button { button_type } => Operation::Button(ButtonOp {
            props,
            button_type: *button_type,
            url: None,
        }),
        WidgetKind::LinkButton { button_type, url } => Operation::Button(ButtonOp {
            props,
            button_type: *button_type,
            url: Some(url.clone()),
        }),
        WidgetKind::PageLink { page, icon } => Operation::PageLink(PageLinkOp {
            props,
            page: page.clone(),
            icon: icon.clone(),
        }),
        WidgetKind::Checkbox => Operation::Checkbox(CheckboxOp {
            props,
            value: expect_bool(widget)?,
        }),
        WidgetKind::Toggle => Operation::Toggle(ToggleOp {
            props,
            value: expect_bool(widget)?,
        }),
        WidgetKind::Radio {
            options,
            captions,
            horizontal,
        } => Operation::Radio(RadioOp {
            props,
            options: options.clone(),
            captions: captions.clone(),
            index: expect_index(widget)?,
            horizontal: *horizontal,
        }),
        WidgetKind::Selectbox {
            options,
            placeholder,
        } => Operation::Selectbox(SelectboxOp {
            props,
            options: options.clone(),
            index: expect_index(widget)?,
            placeholder: placeholder.clone(),
        }),
        WidgetKind::Multiselect {
            options,
            placeholder,
        } => Operation::Multiselect(MultiselectOp {
            props,
            options: options.clone(),
            selected_indices: value
                .as_indices()
                .map(<[i32]>::to_vec)
                .ok_or_else(|| mismatch(widget))?,
            placeholder: placeholder.clone(),
        }),
        WidgetKind::SelectSlider { options } => {
            let WidgetValue::IndexRange(lower_index, upper_index) = *value else {
                return Err(mismatch(widget));
            };
            Operation::SelectSlider(SelectSliderOp {
                props,
                options: options.clone(),
                lower_index,
                upper_index,
            })
        }
        WidgetKind::DateInput {
            min_date,
            max_date,
            today,
            format,
            separator,
        } => {
            let WidgetValue::DateRange(from_date, to_date) = *value else {
                return Err(mismatch(widget));
            };
            Operation::DateInput(DateInputOp {
                props,
                from_date,
                to_date,
                min_date: *min_date,
                max_date: *max_date,
                // An explicit value wins over "today".
                today: *today && from_date.is_none() && to_date.is_none(),
                date_format: *format,
                date_separator: *separator,
            })
        }
        WidgetKind::TimeInput { step_seconds } => Operation::TimeInput(TimeInputOp {
            props,
            value: match value {
                WidgetValue::Time(t) => Some(*t),
                _ => None,
            },
            step_seconds: *step_seconds,
        }),
        WidgetKind::NumberInput {
            min,
            max,
            step,
            format,
            placeholder,
        } => Operation::NumberInput(NumberInputOp {
            props,
            value: value.as_number(),
            min: *min,
            max: *max,
            step: *step,
            format: format.clone(),
            placeholder: placeholder.clone(),
        }),
        WidgetKind::TextInput {
            input_type,
            autocomplete,
            placeholder,
            max_chars,
        } => Operation::TextInput(TextInputOp {
            props,
            input_type: *input_type,
            value: value
                .as_text()
                .map(str::to_string)
                .ok_or_else(|| mismatch(widget))?,
            autocomplete: autocomplete.clone(),
            placeholder: placeholder.clone(),
            max_chars: *max_chars,
        }),
        WidgetKind::Slider { bounds, format } => Operation::Slider(SliderOp {
            props,
            bounds: bounds.clone(),
            value: value.as_slider().cloned().ok_or_else(|| mismatch(widget))?,
            format: format.clone(),
        }),
    };

    Ok(op)
}

fn widget_props(widget: &Widget, container_key: &str) -> WidgetProps {
    let kind = widget.kind();
    WidgetProps {
        container: container_key.to_string(),
        key: widget.key().to_string(),
        label: widget.label().to_string(),
        disabled: widget.is_disabled(),
        help: widget
            .help()
            .filter(|h| !h.trim().is_empty())
            .map(str::to_string),
        label_visibility: kind
            .supports_label_visibility()
            .then(|| widget.label_visibility()),
        use_container_width: kind
            .supports_container_width()
            .then(|| widget.use_container_width()),
    }
}

fn expect_bool(widget: &Widget) -> Result<bool, RequestError> {
    widget.value().as_bool().ok_or_else(|| mismatch(widget))
}

fn expect_index(widget: &Widget) -> Result<i32, RequestError> {
    widget.value().as_index().ok_or_else(|| mismatch(widget))
}

fn mismatch(widget: &Widget) -> RequestError {
    RequestError::Widget(format!(
        "{} '{}' holds {:?}",
        widget.kind().name(),
        widget.key(),
        widget.value()
    ))
}
