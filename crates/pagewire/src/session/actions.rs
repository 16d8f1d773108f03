//! Applies client interactions to registered widgets before a render.

use pagewire_protocol::{Action, ActionPayload, SliderValue};
use tracing::{debug, warn};

use super::SessionState;
use crate::error::RequestError;
use crate::widget::{ChangeEvent, WidgetKind, WidgetValue};

/// Apply `actions` in order.
///
/// Actions for unknown widgets are logged and skipped. A payload that does
/// not fit the addressed widget fails the request.
pub fn apply_actions(session: &SessionState, actions: &[Action]) -> Result<(), RequestError> {
    for action in actions {
        apply_action(session, action)?;
    }
    Ok(())
}

fn apply_action(session: &SessionState, action: &Action) -> Result<(), RequestError> {
    let Some(handle) = session.widget(&action.key) else {
        warn!(
            session_id = %session.session_id(),
            key = %action.key,
            action = action.payload.name(),
            "No widget registered for action, skipping"
        );
        return Ok(());
    };

    let (callback, previous, value) = {
        let mut widget = handle.lock();
        let Some(value) = action_value(widget.kind(), widget.value(), action)? else {
            debug!(key = %action.key, "Action carries no value, keeping current");
            return Ok(());
        };

        let changed = widget
            .set_value(value)
            .map_err(|e| invalid(action, e.to_string()))?;
        debug!(
            session_id = %session.session_id(),
            key = %action.key,
            action = action.payload.name(),
            changed,
            "Applied action"
        );
        if !changed {
            return Ok(());
        }

        match widget.change_callback() {
            Some(callback) => (
                callback,
                widget.previous_value().clone(),
                widget.value().clone(),
            ),
            None => return Ok(()),
        }
    };

    // Invoked without the widget lock so the callback may read the widget.
    callback(&ChangeEvent {
        key: &action.key,
        args: &action.args,
        kwargs: &action.kwargs,
        previous: &previous,
        value: &value,
    });
    Ok(())
}

/// Translate an action payload into the value it sets. `None` means leave
/// the current value alone.
fn action_value(
    kind: &WidgetKind,
    current: &WidgetValue,
    action: &Action,
) -> Result<Option<WidgetValue>, RequestError> {
    let value = match (kind, &action.payload) {
        (WidgetKind::PageLink { .. }, _) => {
            return Err(invalid(action, "page links do not accept actions"));
        }
        (WidgetKind::Button { .. } | WidgetKind::LinkButton { .. }, ActionPayload::Button) => {
            WidgetValue::None
        }
        (WidgetKind::Checkbox, ActionPayload::Checkbox { value })
        | (WidgetKind::Toggle, ActionPayload::Toggle { value }) => WidgetValue::Bool(*value),
        (WidgetKind::Radio { options, .. }, ActionPayload::Radio { index })
        | (WidgetKind::Selectbox { options, .. }, ActionPayload::Selectbox { index }) => {
            check_index(action, options.len(), *index)?;
            WidgetValue::Index(*index)
        }
        (
            WidgetKind::Multiselect { options, .. },
            ActionPayload::Multiselect { selected_indices },
        ) => {
            for index in selected_indices {
                check_index(action, options.len(), *index)?;
            }
            WidgetValue::Indices(selected_indices.clone())
        }
        (
            WidgetKind::SelectSlider { options },
            ActionPayload::SelectSlider {
                lower_index,
                upper_index,
            },
        ) => {
            check_index(action, options.len(), *lower_index)?;
            check_index(action, options.len(), *upper_index)?;
            WidgetValue::IndexRange(*lower_index, *upper_index)
        }
        (WidgetKind::DateInput { .. }, ActionPayload::DateInput { from_date, to_date }) => {
            let WidgetValue::DateRange(current_from, current_to) = current else {
                return Err(invalid(action, "date input holds no date range"));
            };
            WidgetValue::DateRange(from_date.or(*current_from), to_date.or(*current_to))
        }
        (WidgetKind::TimeInput { .. }, ActionPayload::TimeInput { value }) => match value {
            Some(time) => WidgetValue::Time(*time),
            None => return Ok(None),
        },
        (WidgetKind::NumberInput { .. }, ActionPayload::NumberInput { value }) => match value {
            Some(number) => WidgetValue::Number(*number),
            None => return Ok(None),
        },
        (WidgetKind::TextInput { .. }, ActionPayload::TextInput { value }) => {
            WidgetValue::Text(value.clone())
        }
        (WidgetKind::Slider { .. }, ActionPayload::Slider { value }) => {
            if let Some(reason) = inverted_range(value) {
                return Err(invalid(action, reason));
            }
            WidgetValue::Slider(value.clone())
        }
        (kind, payload) => {
            return Err(invalid(
                action,
                format!("{} action sent to {} widget", payload.name(), kind.name()),
            ));
        }
    };
    Ok(Some(value))
}

fn check_index(action: &Action, len: usize, index: i32) -> Result<(), RequestError> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(()),
        _ => Err(invalid(
            action,
            format!("option index {index} out of range for {len} options"),
        )),
    }
}

fn inverted_range(value: &SliderValue) -> Option<&'static str> {
    let inverted = match value {
        SliderValue::IntRange { from, to } => from > to,
        SliderValue::FloatRange { from, to } => from > to,
        SliderValue::DateRange { from, to } => from > to,
        SliderValue::TimeRange { from, to } => from > to,
        _ => false,
    };
    inverted.then_some("range start is after range end")
}

fn invalid(action: &Action, reason: impl Into<String>) -> RequestError {
    RequestError::Action {
        key: action.key.clone(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use pagewire_protocol::IntOrFloat;

    use super::*;
    use crate::widget::{Widget, WidgetHandle};

    fn session_with(widget: Widget) -> (SessionState, WidgetHandle) {
        let session = SessionState::new("s1".to_string(), None);
        let handle = WidgetHandle::new(widget);
        session.register_widget(handle.clone());
        (session, handle)
    }

    #[test]
    fn test_missing_widget_is_skipped() {
        let session = SessionState::new("s1".to_string(), None);
        let action = Action::new("widget_unknown", ActionPayload::Checkbox { value: true });
        apply_actions(&session, &[action]).unwrap();
    }

    #[test]
    fn test_checkbox_action_sets_value_and_fires_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let widget = Widget::checkbox("Agree").on_change(move |event| {
            assert_eq!(event.value, &WidgetValue::Bool(true));
            assert_eq!(event.args, ["from-test".to_string()]);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (session, handle) = session_with(widget);

        let mut action = Action::new(handle.key(), ActionPayload::Checkbox { value: true });
        action.args.push("from-test".to_string());
        apply_actions(&session, &[action.clone()]).unwrap();

        assert!(handle.changed());
        assert_eq!(handle.value(), WidgetValue::Bool(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same value again: no change, no callback.
        handle.update(|w| w.reset_changed());
        apply_actions(&session, &[action]).unwrap();
        assert!(!handle.changed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_button_click_always_changes() {
        let (session, handle) = session_with(Widget::button("Go"));
        let click = Action::new(handle.key(), ActionPayload::Button);

        apply_actions(&session, &[click.clone()]).unwrap();
        assert!(handle.changed());
        handle.update(|w| w.reset_changed());
        apply_actions(&session, &[click]).unwrap();
        assert!(handle.changed());
    }

    #[test]
    fn test_mismatched_action_fails() {
        let (session, handle) = session_with(Widget::checkbox("Agree"));
        let action = Action::new(
            handle.key(),
            ActionPayload::TextInput {
                value: "nope".to_string(),
            },
        );

        let err = apply_actions(&session, &[action]).unwrap_err();
        assert!(matches!(err, RequestError::Action { ref key, .. } if key == handle.key()));
    }

    #[test]
    fn test_page_link_rejects_actions() {
        let (session, handle) = session_with(Widget::page_link("Home", "home"));
        let action = Action::new(handle.key(), ActionPayload::Button);
        assert!(matches!(
            apply_actions(&session, &[action]),
            Err(RequestError::Action { .. })
        ));
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let options = vec!["a".to_string(), "b".to_string()];
        let (session, handle) = session_with(Widget::radio("Pick", options));
        let action = Action::new(handle.key(), ActionPayload::Radio { index: 2 });
        assert!(apply_actions(&session, &[action]).is_err());
        assert!(!handle.changed());
    }

    #[test]
    fn test_date_input_merges_omitted_bound() {
        let (session, handle) = session_with(Widget::date_input("Trip"));
        let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();

        let both = Action::new(
            handle.key(),
            ActionPayload::DateInput {
                from_date: Some(from),
                to_date: Some(to),
            },
        );
        apply_actions(&session, &[both]).unwrap();

        let new_from = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let only_from = Action::new(
            handle.key(),
            ActionPayload::DateInput {
                from_date: Some(new_from),
                to_date: None,
            },
        );
        apply_actions(&session, &[only_from]).unwrap();
        assert_eq!(
            handle.value(),
            WidgetValue::DateRange(Some(new_from), Some(to))
        );
    }

    #[test]
    fn test_number_input_without_value_keeps_current() {
        let (session, handle) = session_with(Widget::number_input("Count"));
        let set = Action::new(
            handle.key(),
            ActionPayload::NumberInput {
                value: Some(IntOrFloat::Int(4)),
            },
        );
        apply_actions(&session, &[set]).unwrap();
        handle.update(|w| w.reset_changed());

        let empty = Action::new(handle.key(), ActionPayload::NumberInput { value: None });
        apply_actions(&session, &[empty]).unwrap();
        assert_eq!(handle.value(), WidgetValue::Number(IntOrFloat::Int(4)));
        assert!(!handle.changed());
    }

    #[test]
    fn test_inverted_slider_range_fails() {
        let (session, handle) = session_with(Widget::int_range_slider("Range", 0, 10));
        let action = Action::new(
            handle.key(),
            ActionPayload::Slider {
                value: SliderValue::IntRange { from: 8, to: 2 },
            },
        );
        assert!(apply_actions(&session, &[action]).is_err());
    }

    #[test]
    fn test_actions_apply_in_order() {
        let (session, handle) = session_with(Widget::text_input("Name"));
        let actions = ["a", "b", "c"].map(|v| {
            Action::new(
                handle.key(),
                ActionPayload::TextInput {
                    value: v.to_string(),
                },
            )
        });
        apply_actions(&session, &actions).unwrap();
        assert_eq!(handle.value(), WidgetValue::Text("c".to_string()));
        assert_eq!(handle.previous_value(), WidgetValue::Text("b".to_string()));
    }
}
