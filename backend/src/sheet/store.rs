//! Ordered collection of named sheets. Order is presentation order.

use super::{Sheet, SheetSnapshot};
use crate::error::{SheetError, SheetResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetStore {
    sheets: Vec<Sheet>,
}

impl SheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Names of sheets that are not hidden, in order.
    pub fn visible_names(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .filter(|s| !s.hidden)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> SheetResult<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SheetError::SheetNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> SheetResult<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SheetError::SheetNotFound(name.to_string()))
    }

    /// Append a new sheet. Fails if the name is taken.
    pub fn insert(&mut self, sheet: Sheet) -> SheetResult<()> {
        if self.contains(&sheet.name) {
            return Err(SheetError::DuplicateSheet(sheet.name));
        }
        self.sheets.push(sheet);
        Ok(())
    }

    /// Append a sheet, deleting any existing sheet of the same name first.
    pub fn upsert(&mut self, sheet: Sheet) {
        self.sheets.retain(|s| s.name != sheet.name);
        self.sheets.push(sheet);
    }

    /// Insert a new sheet immediately before `anchor`.
    pub fn insert_before(&mut self, sheet: Sheet, anchor: &str) -> SheetResult<()> {
        if self.contains(&sheet.name) {
            return Err(SheetError::DuplicateSheet(sheet.name));
        }
        let at = self.anchor_position(&sheet.name, anchor)?;
        self.sheets.insert(at, sheet);
        Ok(())
    }

    pub fn move_before(&mut self, name: &str, anchor: &str) -> SheetResult<()> {
        self.move_relative(name, anchor, 0)
    }

    pub fn move_after(&mut self, name: &str, anchor: &str) -> SheetResult<()> {
        self.move_relative(name, anchor, 1)
    }

    fn move_relative(&mut self, name: &str, anchor: &str, offset: usize) -> SheetResult<()> {
        if name == anchor {
            return Ok(());
        }
        let from = self
            .position(name)
            .ok_or_else(|| SheetError::SheetNotFound(name.to_string()))?;
        // Validate the anchor before moving anything
        self.anchor_position(name, anchor)?;
        let sheet = self.sheets.remove(from);
        let at = self.anchor_position(name, anchor)? + offset;
        self.sheets.insert(at, sheet);
        Ok(())
    }

    fn anchor_position(&self, sheet: &str, anchor: &str) -> SheetResult<usize> {
        self.position(anchor).ok_or_else(|| SheetError::AnchorNotFound {
            sheet: sheet.to_string(),
            anchor: anchor.to_string(),
        })
    }

    pub fn remove(&mut self, name: &str) -> SheetResult<Sheet> {
        let at = self
            .position(name)
            .ok_or_else(|| SheetError::SheetNotFound(name.to_string()))?;
        Ok(self.sheets.remove(at))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> SheetResult<()> {
        if from != to && self.contains(to) {
            return Err(SheetError::DuplicateSheet(to.to_string()));
        }
        self.get_mut(from)?.name = to.to_string();
        Ok(())
    }

    pub fn set_hidden(&mut self, name: &str, hidden: bool) -> SheetResult<()> {
        self.get_mut(name)?.hidden = hidden;
        Ok(())
    }

    /// Append a visible copy of `source` (table only) named `name`.
    pub fn copy_sheet(&mut self, source: &str, name: &str) -> SheetResult<()> {
        let table = self.get(source)?.table.clone();
        self.insert(Sheet::new(name, table))
    }

    pub fn snapshot(&self) -> Vec<SheetSnapshot> {
        self.sheets.iter().map(Sheet::snapshot).collect()
    }
}
