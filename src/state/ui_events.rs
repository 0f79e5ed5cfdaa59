use crate::types::{CustomEvent, UiEvent};

/// Fold one custom stream event into the ordered UI-event list.
///
/// Attach with a known id replaces the entry where it sits; attach with a new
/// id appends. Remove deletes by id and is a no-op for ids never seen.
/// Unrecognized events fall through untouched, so replaying a sequence gives
/// the same list as playing it once (last write per id wins) and unrelated
/// entries never move.
pub fn reduce_ui_events(events: &mut Vec<UiEvent>, incoming: &CustomEvent) {
    match incoming {
        CustomEvent::Attach { id, name, props } => {
            if let Some(existing) = events.iter_mut().find(|event| event.id == *id) {
                existing.name = name.clone();
                existing.props = props.clone();
            } else {
                events.push(UiEvent {
                    id: id.clone(),
                    name: name.clone(),
                    props: props.clone(),
                });
            }
        }
        CustomEvent::Remove { id } => {
            events.retain(|event| event.id != *id);
        }
        CustomEvent::Unknown => {}
    }
}
