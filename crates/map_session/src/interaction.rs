use indexmap::IndexMap;
use model::{
    geometry::{Geometry, GeometryKind, WebMercator},
    shape::{DrawnGeometry, PersistedShape},
};
use utility::id::Id;

use crate::{feature_index::Layer, MapError, MapResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Drawing(GeometryKind),
    Selecting,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractionHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectGesture {
    DoubleClick,
}

/// An interaction attached to the map.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Draw { kind: GeometryKind, layer: Layer },
    Select { layer: Layer, gesture: SelectGesture },
    Modify { shape: Id<PersistedShape> },
}

/// The shape picked by the select gesture. `geometry` follows modify
/// gestures, `original` is what the server has.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub original: PersistedShape,
    pub geometry: Geometry<WebMercator>,
}

impl Selection {
    fn new(shape: PersistedShape) -> Self {
        Self {
            geometry: shape.geometry.clone(),
            original: shape,
        }
    }

    pub fn id(&self) -> &Id<PersistedShape> {
        &self.original.id
    }

    pub fn current(&self) -> PersistedShape {
        PersistedShape::new(self.original.id.clone(), self.geometry.clone())
    }
}

/// What [`InteractionStateMachine::discard`] threw away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discarded {
    pub cancelled_draw: bool,
    pub dropped_drawing: bool,
    /// The selected shape as it was before any modification.
    pub restored: Option<PersistedShape>,
}

/// Owns every interaction attached to the map. Draw and select/modify are
/// never attached at the same time.
#[derive(Debug)]
pub struct InteractionStateMachine {
    target: Layer,
    state: InteractionState,
    attached: IndexMap<InteractionHandle, Interaction>,
    draw: Option<InteractionHandle>,
    select: Option<InteractionHandle>,
    modify: Option<InteractionHandle>,
    next_handle: u64,
    selection_enabled: bool,
    drawn: Option<DrawnGeometry>,
    selection: Option<Selection>,
}

impl InteractionStateMachine {
    pub fn new(target: Layer) -> Self {
        Self {
            target,
            state: InteractionState::Idle,
            attached: IndexMap::new(),
            draw: None,
            select: None,
            modify: None,
            next_handle: 0,
            selection_enabled: false,
            drawn: None,
            selection: None,
        }
    }

    fn attach(&mut self, interaction: Interaction) -> InteractionHandle {
        let handle = InteractionHandle(self.next_handle);
        self.next_handle += 1;
        log::debug!("attaching {interaction:?}");
        self.attached.insert(handle, interaction);
        handle
    }

    fn detach(
        attached: &mut IndexMap<InteractionHandle, Interaction>,
        slot: &mut Option<InteractionHandle>,
    ) -> bool {
        match slot.take() {
            Some(handle) => attached.shift_remove(&handle).is_some(),
            None => false,
        }
    }

    fn rearm_selection(&mut self) {
        if self.selection_enabled && self.select.is_none() {
            let handle = self.attach(Interaction::Select {
                layer: self.target,
                gesture: SelectGesture::DoubleClick,
            });
            self.select = Some(handle);
        }
    }

    pub fn start_draw(&mut self, kind: GeometryKind) -> MapResult<()> {
        match self.state {
            InteractionState::Drawing(current) => {
                log::debug!("already drawing a {current}, ignoring draw of {kind}");
                Ok(())
            }
            InteractionState::Selecting | InteractionState::Editing => Err(MapError::precondition(
                "a shape is selected, discard it before drawing",
            )),
            InteractionState::Idle => {
                Self::detach(&mut self.attached, &mut self.select);
                let handle = self.attach(Interaction::Draw {
                    kind,
                    layer: self.target,
                });
                self.draw = Some(handle);
                self.state = InteractionState::Drawing(kind);
                Ok(())
            }
        }
    }

    /// Handles the draw-end gesture. Replaces any earlier drawn geometry.
    pub fn finish_draw(&mut self, geometry: Geometry<WebMercator>) -> MapResult<&DrawnGeometry> {
        let InteractionState::Drawing(kind) = self.state else {
            return Err(MapError::precondition("no draw in progress"));
        };
        if geometry.kind() != kind {
            return Err(MapError::precondition(format!(
                "expected a {kind}, got a {}",
                geometry.kind()
            )));
        }
        Self::detach(&mut self.attached, &mut self.draw);
        self.state = InteractionState::Idle;
        self.rearm_selection();
        Ok(self.drawn.insert(DrawnGeometry { geometry }))
    }

    /// Arms the select gesture on the target layer. Drops any selection or
    /// edit in progress; a running draw keeps going and selection comes back
    /// once it ends.
    pub fn enable_selection(&mut self) {
        self.selection_enabled = true;
        Self::detach(&mut self.attached, &mut self.select);
        Self::detach(&mut self.attached, &mut self.modify);
        self.selection = None;
        if matches!(self.state, InteractionState::Drawing(_)) {
            return;
        }
        self.state = InteractionState::Idle;
        self.rearm_selection();
    }

    /// Handles the select gesture.
    pub fn select(&mut self, shape: PersistedShape) -> MapResult<()> {
        if self.select.is_none() {
            return Err(MapError::precondition("selection is not enabled"));
        }
        log::debug!("selected shape {}", shape.id);
        self.selection = Some(Selection::new(shape));
        self.state = InteractionState::Selecting;
        Ok(())
    }

    pub fn enable_edit(&mut self) -> MapResult<()> {
        match self.state {
            InteractionState::Editing => Ok(()),
            InteractionState::Selecting => {
                let Some(selection) = &self.selection else {
                    return Err(MapError::precondition("no shape selected"));
                };
                let shape = selection.id().clone();
                Self::detach(&mut self.attached, &mut self.select);
                let handle = self.attach(Interaction::Modify { shape });
                self.modify = Some(handle);
                self.state = InteractionState::Editing;
                Ok(())
            }
            _ => Err(MapError::precondition("no shape selected")),
        }
    }

    /// Handles the modify-end gesture and returns the shape as it is now.
    pub fn update_edit(&mut self, geometry: Geometry<WebMercator>) -> MapResult<PersistedShape> {
        if self.state != InteractionState::Editing {
            return Err(MapError::precondition("no shape is being edited"));
        }
        let Some(selection) = self.selection.as_mut() else {
            return Err(MapError::precondition("no shape is being edited"));
        };
        if geometry.kind() != selection.original.kind() {
            return Err(MapError::precondition(format!(
                "a {} can not become a {}",
                selection.original.kind(),
                geometry.kind()
            )));
        }
        selection.geometry = geometry;
        Ok(selection.current())
    }

    /// Ends the edit after a successful save and returns the saved shape.
    pub fn commit_edit(&mut self) -> Option<PersistedShape> {
        let selection = self.selection.take()?;
        Self::detach(&mut self.attached, &mut self.modify);
        self.state = InteractionState::Idle;
        self.rearm_selection();
        Some(selection.current())
    }

    /// Records that the server now has `saved` while the edit goes on. A
    /// later discard restores `saved`. Returns whether `saved` is the
    /// selected shape.
    pub fn rebase_edit(&mut self, saved: PersistedShape) -> bool {
        match self.selection.as_mut() {
            Some(selection) if selection.original.id == saved.id => {
                selection.original = saved;
                true
            }
            _ => false,
        }
    }

    /// Forgets the selection without touching a drawn geometry. Returns the
    /// shape as it was when selected.
    pub fn deselect(&mut self) -> Option<PersistedShape> {
        let selection = self.selection.take()?;
        Self::detach(&mut self.attached, &mut self.modify);
        self.state = InteractionState::Idle;
        self.rearm_selection();
        Some(selection.original)
    }

    /// Cancels whatever is in progress: a running draw, an unsaved drawing,
    /// a selection or an edit.
    pub fn discard(&mut self) -> Discarded {
        let cancelled_draw = Self::detach(&mut self.attached, &mut self.draw);
        Self::detach(&mut self.attached, &mut self.modify);
        let discarded = Discarded {
            cancelled_draw,
            dropped_drawing: self.drawn.take().is_some(),
            restored: self.selection.take().map(|selection| selection.original),
        };
        self.state = InteractionState::Idle;
        self.rearm_selection();
        discarded
    }

    /// Removes the drawn geometry, usually because it has been saved.
    pub fn take_drawn(&mut self) -> Option<DrawnGeometry> {
        self.drawn.take()
    }

    /// Detaches everything and forgets all state, including whether
    /// selection was enabled.
    pub fn teardown(&mut self) {
        Self::detach(&mut self.attached, &mut self.draw);
        Self::detach(&mut self.attached, &mut self.select);
        Self::detach(&mut self.attached, &mut self.modify);
        self.selection_enabled = false;
        self.selection = None;
        self.drawn = None;
        self.state = InteractionState::Idle;
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn drawn(&self) -> Option<&DrawnGeometry> {
        self.drawn.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn is_selection_enabled(&self) -> bool {
        self.selection_enabled
    }

    pub fn attached(&self) -> impl Iterator<Item = (InteractionHandle, &Interaction)> {
        self.attached.iter().map(|(handle, interaction)| (*handle, interaction))
    }

    pub fn can_save(&self) -> bool {
        self.drawn.is_some() || self.selection.is_some()
    }

    pub fn can_edit(&self) -> bool {
        self.state == InteractionState::Selecting
    }
}
