//! Dashboard widget layout: which side-panel widgets show, and in what order.

use serde::{Deserialize, Serialize};

/// A side-panel widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Tip,
    Quote,
    Notes,
    Weather,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 4] = [Self::Tip, Self::Quote, Self::Notes, Self::Weather];

    pub fn label(self) -> &'static str {
        match self {
            Self::Tip => "Tip of the Day",
            Self::Quote => "Quote",
            Self::Notes => "Quick Notes",
            Self::Weather => "Weather",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSlot {
    pub kind: WidgetKind,
    pub visible: bool,
}

/// Ordered widget slots. Serialized as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetLayout {
    slots: Vec<WidgetSlot>,
}

impl Default for WidgetLayout {
    fn default() -> Self {
        Self {
            slots: WidgetKind::ALL
                .iter()
                .map(|&kind| WidgetSlot {
                    kind,
                    visible: kind != WidgetKind::Weather,
                })
                .collect(),
        }
    }
}

impl WidgetLayout {
    /// Build from stored slots, dropping duplicates and appending any missing
    /// kinds (hidden) so every widget appears exactly once.
    pub fn from_slots(slots: Vec<WidgetSlot>) -> Self {
        let mut normalized: Vec<WidgetSlot> = Vec::with_capacity(WidgetKind::ALL.len());
        for slot in slots {
            if !normalized.iter().any(|s| s.kind == slot.kind) {
                normalized.push(slot);
            }
        }
        for kind in WidgetKind::ALL {
            if !normalized.iter().any(|s| s.kind == kind) {
                normalized.push(WidgetSlot {
                    kind,
                    visible: false,
                });
            }
        }
        Self { slots: normalized }
    }

    pub fn slots(&self) -> &[WidgetSlot] {
        &self.slots
    }

    /// Visible widgets in display order.
    pub fn visible(&self) -> impl Iterator<Item = WidgetKind> + '_ {
        self.slots.iter().filter(|s| s.visible).map(|s| s.kind)
    }

    pub fn is_visible(&self, kind: WidgetKind) -> bool {
        self.slots.iter().any(|s| s.kind == kind && s.visible)
    }

    /// Flip visibility of `kind`. Returns the new visibility.
    pub fn toggle(&mut self, kind: WidgetKind) -> bool {
        match self.slots.iter_mut().find(|s| s.kind == kind) {
            Some(slot) => {
                slot.visible = !slot.visible;
                slot.visible
            }
            None => false,
        }
    }

    /// Move the slot at `from` to position `to`.
    ///
    /// Out-of-range indices leave the layout unchanged and return `false`.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.slots.len() || to >= self.slots.len() {
            return false;
        }
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        true
    }
}
