//! The partial home-layout accumulator (spec.md §4.10).
//!
//! During a `get_home` call the plugin may call `env.send_partial_result`
//! any number of times, each time with either a complete `HomeLayout` or a
//! single `HomeComponent`. The accumulator keys entries by component title
//! (a synthetic index when absent, per spec.md §9 "Partial-result
//! accumulator identity") so a later emission for the same titled component
//! replaces the earlier one instead of appending a duplicate.

use crate::domain::{HomeComponent, HomeLayout};

enum Key {
    Title(String),
    Index(usize),
}

struct Slot {
    key: Key,
    component: HomeComponent,
}

/// Per-call accumulator state. Cleared on entry and exit by the dispatcher
/// (spec.md §4.10: "The accumulator is per-call and cleared on entry and
/// exit").
#[derive(Default)]
pub struct HomeAccumulator {
    slots: Vec<Slot>,
    next_index: usize,
}

impl HomeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Accept one partial emission. Returns the accumulated layout so far,
    /// to be handed to the caller's `onPartial` callback.
    pub fn push(&mut self, partial: PartialHome) -> HomeLayout {
        match partial {
            PartialHome::Layout(layout) => {
                self.slots.clear();
                self.next_index = 0;
                for component in layout.components {
                    self.insert(component);
                }
            }
            PartialHome::Component(component) => self.insert(component),
        }
        self.snapshot()
    }

    fn insert(&mut self, component: HomeComponent) {
        let key = match &component.title {
            Some(title) => Key::Title(title.clone()),
            None => {
                let index = self.next_index;
                self.next_index += 1;
                Key::Index(index)
            }
        };
        if let Key::Title(ref title) = key {
            if let Some(slot) = self.slots.iter_mut().find(|slot| matches!(&slot.key, Key::Title(t) if t == title))
            {
                slot.component = component;
                return;
            }
        }
        self.slots.push(Slot { key, component });
    }

    pub fn snapshot(&self) -> HomeLayout {
        HomeLayout { components: self.slots.iter().map(|slot| slot.component.clone()).collect() }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_index = 0;
    }
}

/// One `send_partial_result` emission, decoded per the two wire variants in
/// spec.md §4.10.
pub enum PartialHome {
    Layout(HomeLayout),
    Component(HomeComponent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HomeComponentValue;

    fn component(title: Option<&str>) -> HomeComponent {
        HomeComponent {
            title: title.map(|s| s.to_string()),
            subtitle: None,
            value: HomeComponentValue::Scroller,
        }
    }

    #[test]
    fn titled_emissions_replace_in_place() {
        let mut acc = HomeAccumulator::new();
        acc.push(PartialHome::Component(component(Some("Trending"))));
        let snapshot = acc.push(PartialHome::Component(component(Some("Trending"))));
        assert_eq!(snapshot.components.len(), 1);
    }

    #[test]
    fn untitled_emissions_each_get_a_unique_slot() {
        let mut acc = HomeAccumulator::new();
        acc.push(PartialHome::Component(component(None)));
        let snapshot = acc.push(PartialHome::Component(component(None)));
        assert_eq!(snapshot.components.len(), 2);
    }

    #[test]
    fn emission_order_is_preserved() {
        let mut acc = HomeAccumulator::new();
        acc.push(PartialHome::Component(component(Some("A"))));
        acc.push(PartialHome::Component(component(Some("B"))));
        let snapshot = acc.push(PartialHome::Component(component(Some("C"))));
        let titles: Vec<_> = snapshot.components.iter().map(|c| c.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn clear_resets_state() {
        let mut acc = HomeAccumulator::new();
        acc.push(PartialHome::Component(component(Some("A"))));
        acc.clear();
        assert!(acc.is_empty());
    }
}
