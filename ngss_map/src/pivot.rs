//! Aggregation of normalized records into a grade-by-unit display table.

use std::collections::{BTreeMap, HashSet};
use std::io;

use crate::unit::{column_order, UnitCode};
use crate::{CurriculumRecord, Grade, MapError};

/// Content of one `(grade, unit)` cell: the unit heading plus its activities.
///
/// Cells are derived fresh from the record snapshot on every selection and are
/// never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayCell {
    pub title: String,
    pub activities: Vec<String>,
}

impl DisplayCell {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.activities.is_empty()
    }

    /// Heading line followed by one line per activity.
    pub fn plaintext(&self) -> String {
        let mut lines = Vec::with_capacity(self.activities.len() + 1);
        if !self.title.is_empty() {
            lines.push(self.title.as_str());
        }
        lines.extend(self.activities.iter().map(String::as_str));
        lines.join("\n")
    }
}

/// Pivoted view of the records for one practice: grade rows by unit columns.
#[derive(Clone, Debug, PartialEq)]
pub struct PivotTable {
    pub practice: String,
    /// Row order: the selected grades in canonical order.
    pub grades: Vec<Grade>,
    /// Column order: unit codes numerically, the codeless bucket last.
    pub columns: Vec<Option<UnitCode>>,
    cells: BTreeMap<(Grade, Option<UnitCode>), DisplayCell>,
}

impl PivotTable {
    /// True when nothing matched the selection: zero rows, zero columns.
    pub fn is_empty(&self) -> bool {
        self.grades.is_empty()
    }

    pub fn cell(&self, grade: Grade, column: Option<UnitCode>) -> Option<&DisplayCell> {
        self.cells.get(&(grade, column))
    }

    /// Header label for a column; the codeless bucket has an empty label.
    pub fn column_label(column: Option<UnitCode>) -> String {
        column.map(|code| code.to_string()).unwrap_or_default()
    }

    /// Export the table as CSV: grade row labels, unit-code column headers,
    /// cell text with embedded newlines separating heading from activities.
    /// Empty cells export as empty fields.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), MapError> {
        let mut writer = csv::Writer::from_writer(writer);
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push("Grade".to_string());
        header.extend(self.columns.iter().map(|&c| Self::column_label(c)));
        writer
            .write_record(&header)
            .map_err(|e| MapError::CsvWrite(e.to_string()))?;

        for &grade in &self.grades {
            let mut row = Vec::with_capacity(self.columns.len() + 1);
            row.push(grade.label().to_string());
            for &column in &self.columns {
                let text = self
                    .cell(grade, column)
                    .map(DisplayCell::plaintext)
                    .unwrap_or_default();
                row.push(text);
            }
            writer
                .write_record(&row)
                .map_err(|e| MapError::CsvWrite(e.to_string()))?;
        }
        writer.flush().map_err(|e| MapError::CsvWrite(e.to_string()))?;
        Ok(())
    }
}

/// Drop empty strings and duplicates, keeping the first occurrence of each.
pub fn dedupe_keep_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Build the pivot table for one practice over the selected grades.
///
/// Rows are the selected grades in canonical order; a selected grade keeps its
/// row even when all of its cells are empty. Columns are the unit codes seen
/// in the filtered records. An empty post-filter set yields an empty table,
/// not an error.
pub fn build_table(records: &[CurriculumRecord], practice: &str, grades: &[Grade]) -> PivotTable {
    let selected: Vec<Grade> = Grade::ALL
        .iter()
        .copied()
        .filter(|grade| grades.contains(grade))
        .collect();

    let filtered: Vec<&CurriculumRecord> = records
        .iter()
        .filter(|r| r.practice == practice && selected.contains(&r.grade))
        .collect();

    if filtered.is_empty() {
        return PivotTable {
            practice: practice.to_string(),
            grades: Vec::new(),
            columns: Vec::new(),
            cells: BTreeMap::new(),
        };
    }

    let mut columns: Vec<Option<UnitCode>> = Vec::new();
    for record in &filtered {
        if !columns.contains(&record.unit_code) {
            columns.push(record.unit_code);
        }
    }
    columns.sort_by(column_order);

    let mut titles: BTreeMap<(Grade, Option<UnitCode>), String> = BTreeMap::new();
    let mut activities: BTreeMap<(Grade, Option<UnitCode>), Vec<String>> = BTreeMap::new();
    for record in &filtered {
        let key = (record.grade, record.unit_code);
        activities
            .entry(key)
            .or_default()
            .push(record.activity.clone());
        if !record.unit_title.is_empty() {
            titles
                .entry(key)
                .or_insert_with(|| record.unit_title.clone());
        }
    }

    let mut cells = BTreeMap::new();
    for (key, raw) in activities {
        cells.insert(
            key,
            DisplayCell {
                title: titles.get(&key).cloned().unwrap_or_default(),
                activities: dedupe_keep_order(raw),
            },
        );
    }

    PivotTable {
        practice: practice.to_string(),
        grades: selected,
        columns,
        cells,
    }
}
