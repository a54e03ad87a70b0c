use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of distinct attachment orientations (quarter turns).
pub const ORIENTATIONS: u8 = 4;

/// Body part catalog. Arity is the number of child attachment slots; sensor
/// and motor counts drive the brain parameter layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartKind {
    Core,
    FixedBrick,
    ActiveHinge,
    PassiveHinge,
    ActiveWheel,
    ActiveWheg,
    LightSensor,
    TouchSensor,
}

impl PartKind {
    pub fn arity(self) -> usize {
        match self {
            PartKind::Core => 4,
            PartKind::FixedBrick => 3,
            PartKind::ActiveHinge | PartKind::PassiveHinge => 1,
            PartKind::ActiveWheel
            | PartKind::ActiveWheg
            | PartKind::LightSensor
            | PartKind::TouchSensor => 0,
        }
    }

    /// Sensor channels contributed to the brain input layer. The core
    /// carries the six-channel IMU (three acceleration, three gyro axes).
    pub fn sensor_count(self) -> usize {
        match self {
            PartKind::Core => 6,
            PartKind::LightSensor => 1,
            PartKind::TouchSensor => 2,
            _ => 0,
        }
    }

    pub fn motor_count(self) -> usize {
        match self {
            PartKind::ActiveHinge | PartKind::ActiveWheel | PartKind::ActiveWheg => 1,
            _ => 0,
        }
    }
}

/// A node in the body tree.
#[derive(Clone, Serialize, Deserialize)]
pub struct BodyPart {
    kind: PartKind,
    orientation: u8,
    parent: Option<String>,
    slots: Vec<Option<String>>,
}

impl BodyPart {
    fn new(kind: PartKind, orientation: u8, parent: Option<String>) -> Self {
        Self {
            kind,
            orientation,
            parent,
            slots: vec![None; kind.arity()],
        }
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    pub fn orientation(&self) -> u8 {
        self.orientation
    }

    /// Id of the part this one hangs off; `None` for the root.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Child slots in attachment order; free slots are `None`.
    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A robot genome: the body tree held as an id-keyed part arena plus the
/// flat brain parameter vectors derived from it.
///
/// The arena is an ordered map so that picking the n-th id is deterministic
/// for a given RNG draw. In the logical brain sequence weights always
/// precede biases; crossover relies on that ordering.
#[derive(Clone, Serialize, Deserialize)]
pub struct Genome {
    body: BTreeMap<String, BodyPart>,
    root: Option<String>,
    weights: Vec<f64>,
    biases: Vec<f64>,
    dirty: bool,
}

impl Genome {
    /// Create a genome whose body is a single root part.
    pub fn new(root_id: &str, kind: PartKind, orientation: u8) -> Result<Self, BodyError> {
        if orientation >= ORIENTATIONS {
            return Err(BodyError::InvalidOrientation(orientation));
        }
        let mut body = BTreeMap::new();
        body.insert(root_id.to_string(), BodyPart::new(kind, orientation, None));
        let mut genome = Self {
            body,
            root: Some(root_id.to_string()),
            weights: Vec::new(),
            biases: Vec::new(),
            dirty: false,
        };
        genome.sync_brain();
        Ok(genome)
    }

    /// Deep copy of a parent genome. The copy starts clean; the parent is
    /// never touched by engine operations afterwards.
    pub fn from_parent(parent: &Genome) -> Genome {
        let mut child = parent.clone();
        child.dirty = false;
        child
    }

    /// Attach a new part to a free slot of an existing part.
    pub fn attach(
        &mut self,
        parent_id: &str,
        slot: usize,
        id: &str,
        kind: PartKind,
        orientation: u8,
    ) -> Result<(), BodyError> {
        if orientation >= ORIENTATIONS {
            return Err(BodyError::InvalidOrientation(orientation));
        }
        if self.body.contains_key(id) {
            return Err(BodyError::DuplicatePart(id.to_string()));
        }
        let parent = self
            .body
            .get_mut(parent_id)
            .ok_or_else(|| BodyError::UnknownPart(parent_id.to_string()))?;
        let arity = parent.kind.arity();
        if slot >= arity {
            return Err(BodyError::SlotOutOfRange {
                part: parent_id.to_string(),
                slot,
                arity,
            });
        }
        if parent.slots[slot].is_some() {
            return Err(BodyError::SlotOccupied {
                part: parent_id.to_string(),
                slot,
            });
        }
        parent.slots[slot] = Some(id.to_string());
        self.body.insert(
            id.to_string(),
            BodyPart::new(kind, orientation, Some(parent_id.to_string())),
        );
        self.sync_brain();
        self.dirty = true;
        Ok(())
    }

    /// Remove a part and every part reachable through it, freeing the slot
    /// it occupied on its parent. Trimming at the root empties the body.
    /// Returns the number of parts removed.
    pub fn trim_at(&mut self, id: &str) -> Result<usize, BodyError> {
        let doomed = self.subtree(id)?;
        if let Some(parent_id) = self.body[id].parent.clone() {
            if let Some(parent) = self.body.get_mut(&parent_id) {
                for slot in parent.slots.iter_mut() {
                    if slot.as_deref() == Some(id) {
                        *slot = None;
                    }
                }
            }
        }
        for part_id in &doomed {
            self.body.remove(part_id);
        }
        if self.root.as_deref() == Some(id) {
            self.root = None;
        }
        self.sync_brain();
        self.dirty = true;
        Ok(doomed.len())
    }

    /// Bump a part's orientation by the given number of quarter turns.
    pub fn rotate_part(&mut self, id: &str, quarter_turns: u8) -> Result<(), BodyError> {
        let part = self
            .body
            .get_mut(id)
            .ok_or_else(|| BodyError::UnknownPart(id.to_string()))?;
        let turn = quarter_turns % ORIENTATIONS;
        if turn != 0 {
            part.orientation = (part.orientation + turn) % ORIENTATIONS;
            self.dirty = true;
        }
        Ok(())
    }

    /// The part itself plus every part reachable through it, in depth-first
    /// order.
    pub fn subtree(&self, id: &str) -> Result<Vec<String>, BodyError> {
        if !self.body.contains_key(id) {
            return Err(BodyError::UnknownPart(id.to_string()));
        }
        let mut order = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(part) = self.body.get(&current) {
                for slot in part.slots.iter().rev() {
                    if let Some(child) = slot {
                        stack.push(child.clone());
                    }
                }
            }
            order.push(current);
        }
        Ok(order)
    }

    pub fn part(&self, id: &str) -> Option<&BodyPart> {
        self.body.get(id)
    }

    /// Part ids in arena (lexicographic) order.
    pub fn part_ids(&self) -> impl Iterator<Item = &str> {
        self.body.keys().map(String::as_str)
    }

    pub fn part_count(&self) -> usize {
        self.body.len()
    }

    pub fn body_is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Brain input width: total sensor channels over all parts.
    pub fn input_count(&self) -> usize {
        self.body.values().map(|p| p.kind.sensor_count()).sum()
    }

    /// Brain output width: total motor channels over all parts.
    pub fn output_count(&self) -> usize {
        self.body.values().map(|p| p.kind.motor_count()).sum()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    /// Combined brain length: weight count plus bias count.
    pub fn brain_len(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Mutable handles over the full brain sequence, weights first, then
    /// biases. Callers that change values through these mark the genome
    /// dirty themselves.
    pub fn brain_params_mut(&mut self) -> Vec<&mut f64> {
        self.weights
            .iter_mut()
            .chain(self.biases.iter_mut())
            .collect()
    }

    /// Re-derive the brain parameter counts from the current body. The
    /// controller is a single-layer sensor-to-motor perceptron: one weight
    /// per input/output pair and one bias per output. Surviving values are
    /// kept by prefix; growth is zero-filled.
    pub(crate) fn sync_brain(&mut self) {
        let inputs = self.input_count();
        let outputs = self.output_count();
        self.weights.resize(inputs * outputs, 0.0);
        self.biases.resize(outputs, 0.0);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the dirty flag, typically after the genome has been re-scored.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Errors raised by structural edits and queries on the body tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    UnknownPart(String),
    DuplicatePart(String),
    SlotOutOfRange { part: String, slot: usize, arity: usize },
    SlotOccupied { part: String, slot: usize },
    InvalidOrientation(u8),
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use BodyError::*;
        match self {
            UnknownPart(id) => write!(f, "no part with id {:?}", id),
            DuplicatePart(id) => write!(f, "part id {:?} already in use", id),
            SlotOutOfRange { part, slot, arity } => {
                write!(
                    f,
                    "slot {} out of range for part {:?} (arity {})",
                    slot, part, arity
                )
            }
            SlotOccupied { part, slot } => {
                write!(f, "slot {} of part {:?} is occupied", slot, part)
            }
            InvalidOrientation(o) => write!(f, "orientation {} not below {}", o, ORIENTATIONS),
        }
    }
}

impl std::error::Error for BodyError {}
