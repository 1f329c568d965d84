//! Ordering of the units (lessons) inside a training program.
//!
//! Every function here keeps `order` equal to the unit's 1-based position.
//! Nothing is sent to the backend until [`UnitList::save`].

use shared::domain::{ProgramId, TrainingProgramUnit, UnitId};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{ListKind, PortalStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("unit {0} is not in the list")]
    UnknownUnit(UnitId),
}

fn position(units: &[TrainingProgramUnit], id: UnitId) -> Result<usize, ReorderError> {
    units
        .iter()
        .position(|unit| unit.id == id)
        .ok_or(ReorderError::UnknownUnit(id))
}

pub fn reindex(units: &mut [TrainingProgramUnit]) {
    for (index, unit) in units.iter_mut().enumerate() {
        unit.order = index as u32 + 1;
    }
}

/// Units sorted by their stored `order`, then renumbered from 1.
pub fn normalized(units: &[TrainingProgramUnit]) -> Vec<TrainingProgramUnit> {
    let mut sorted = units.to_vec();
    sorted.sort_by_key(|unit| unit.order);
    reindex(&mut sorted);
    sorted
}

/// Drag-end handling: takes `from` out of the list and puts it where `to`
/// currently sits.
pub fn move_unit(
    units: &[TrainingProgramUnit],
    from: UnitId,
    to: UnitId,
) -> Result<Vec<TrainingProgramUnit>, ReorderError> {
    let from_index = position(units, from)?;
    let to_index = position(units, to)?;

    let mut moved = units.to_vec();
    let unit = moved.remove(from_index);
    moved.insert(to_index, unit);
    reindex(&mut moved);
    Ok(moved)
}

pub fn remove_unit(
    units: &[TrainingProgramUnit],
    id: UnitId,
) -> Result<Vec<TrainingProgramUnit>, ReorderError> {
    let index = position(units, id)?;
    let mut remaining = units.to_vec();
    remaining.remove(index);
    reindex(&mut remaining);
    Ok(remaining)
}

/// Lead is a per-unit flag; other units keep theirs.
pub fn set_lead(
    units: &mut [TrainingProgramUnit],
    id: UnitId,
    is_lead: bool,
) -> Result<(), ReorderError> {
    let index = position(units, id)?;
    units[index].is_lead = is_lead;
    Ok(())
}

/// Editable unit list of one program.
#[derive(Debug, Clone)]
pub struct UnitList {
    program_id: ProgramId,
    units: Vec<TrainingProgramUnit>,
    dirty: bool,
}

impl UnitList {
    pub fn new(program_id: ProgramId, units: &[TrainingProgramUnit]) -> Self {
        Self {
            program_id,
            units: normalized(units),
            dirty: false,
        }
    }

    pub fn units(&self) -> &[TrainingProgramUnit] {
        &self.units
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn move_unit(&mut self, from: UnitId, to: UnitId) -> Result<(), ReorderError> {
        self.units = move_unit(&self.units, from, to)?;
        self.dirty |= from != to;
        Ok(())
    }

    pub fn push(&mut self, mut unit: TrainingProgramUnit) {
        unit.order = self.units.len() as u32 + 1;
        self.units.push(unit);
        self.dirty = true;
    }

    pub fn remove(&mut self, id: UnitId) -> Result<(), ReorderError> {
        self.units = remove_unit(&self.units, id)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_lead(&mut self, id: UnitId, is_lead: bool) -> Result<(), ReorderError> {
        set_lead(&mut self.units, id, is_lead)?;
        self.dirty = true;
        Ok(())
    }

    /// Sends the whole list and refreshes the program list on success.
    pub async fn save(&mut self, store: &PortalStore) -> anyhow::Result<()> {
        if let Err(err) = store
            .api()
            .update_program_units(self.program_id, &self.units)
            .await
        {
            store.notify_error(format!("failed to save units: {err}"));
            return Err(err);
        }
        info!(
            "units: saved program={} units={}",
            self.program_id,
            self.units.len()
        );
        self.dirty = false;
        if let Err(err) = store.refresh(ListKind::Programs).await {
            warn!("units: program list refresh failed after save: {err:#}");
        }
        store.notify("units saved");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
