//! Core curriculum practices-map library implemented in Rust.
//!
//! Loads per-grade CSV files of curriculum activities, normalizes their
//! heterogeneous column naming into [`CurriculumRecord`]s, and pivots them
//! into a grade-by-unit display table (see [`pivot`]).

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod pivot;
pub mod unit;

pub use pivot::{build_table, dedupe_keep_order, DisplayCell, PivotTable};
pub use unit::{split_unit_field, UnitCode};

#[derive(Error, Debug)]
pub enum MapError {
    #[error("missing input file: {0}")]
    MissingFile(PathBuf),
    #[error("cannot resolve required column `{field}` in {file}")]
    Schema { file: String, field: &'static str },
    #[error("failed to read CSV from {file}: {message}")]
    CsvParse { file: String, message: String },
    #[error("failed to write CSV: {0}")]
    CsvWrite(String),
    #[error("failed to load manifest: {0}")]
    Manifest(String),
    #[error("unknown grade label: {0}")]
    UnknownGrade(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// School grades covered by the map, in canonical display order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    Fourth,
    Sixth,
    Seventh,
    Ninth,
    Tenth,
}

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::Fourth,
        Grade::Sixth,
        Grade::Seventh,
        Grade::Ninth,
        Grade::Tenth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Grade::Fourth => "4th",
            Grade::Sixth => "6th",
            Grade::Seventh => "7th",
            Grade::Ninth => "9th",
            Grade::Tenth => "10th",
        }
    }

    /// Case-insensitive lookup of a grade by its display label.
    pub fn from_label(label: &str) -> Option<Grade> {
        let trimmed = label.trim();
        Grade::ALL
            .iter()
            .copied()
            .find(|grade| grade.label().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Grade {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::from_label(s).ok_or_else(|| MapError::UnknownGrade(s.to_string()))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Params {
    /// Treat positional column fallbacks as schema errors instead of warnings.
    pub strict_headers: bool,
    /// Accept only unit codes whose number lies in this inclusive range;
    /// out-of-range codes are treated as unrecognized.
    pub code_range: Option<(u32, u32)>,
}

/// One normalized input row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurriculumRecord {
    pub grade: Grade,
    pub practice: String,
    pub unit_code: Option<UnitCode>,
    pub unit_title: String,
    pub activity: String,
}

/// Non-fatal findings recorded while loading grade files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LoadWarning {
    MissingFile { grade: Grade, path: PathBuf },
    ColumnFallback {
        file: String,
        field: String,
        column: usize,
        header: String,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::MissingFile { grade, path } => {
                write!(f, "could not load {} for {}: file is missing", path.display(), grade)
            }
            LoadWarning::ColumnFallback {
                file,
                field,
                column,
                header,
            } => write!(
                f,
                "{}: no {} column matched by name; fell back to column {} (`{}`)",
                file, field, column, header
            ),
        }
    }
}

/// Snapshot of all loaded records plus everything worth surfacing about the load.
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    pub records: Vec<CurriculumRecord>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct practice values, for populating a selector.
    pub fn practices(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for record in &self.records {
            if !record.practice.is_empty() && !out.contains(&record.practice) {
                out.push(record.practice.clone());
            }
        }
        out.sort();
        out
    }

    /// Grades with at least one record, in canonical order.
    pub fn grades(&self) -> Vec<Grade> {
        Grade::ALL
            .iter()
            .copied()
            .filter(|grade| self.records.iter().any(|r| r.grade == *grade))
            .collect()
    }
}

const PRACTICE_SYNONYMS: &[&str] = &["ngss practice", "ngss", "practice"];
const UNIT_SYNONYMS: &[&str] = &["unit", "unit name", "unit_title"];
const ACTIVITY_SYNONYMS: &[&str] = &["activity/assessment", "activity", "assignment", "task"];

#[derive(Clone, Copy, Debug)]
struct ColumnMap {
    practice: usize,
    unit: usize,
    activity: usize,
}

fn resolve_columns(
    headers: &csv::StringRecord,
    file: &str,
    params: &Params,
    warnings: &mut Vec<LoadWarning>,
) -> Result<ColumnMap, MapError> {
    let lowered: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let mut resolve = |field: &'static str,
                       synonyms: &[&str],
                       fallback: Option<usize>|
     -> Result<usize, MapError> {
        for synonym in synonyms {
            if let Some(index) = lowered.iter().position(|h| h == synonym) {
                return Ok(index);
            }
        }
        let index = fallback.ok_or(MapError::Schema { file: file.to_string(), field })?;
        if params.strict_headers {
            return Err(MapError::Schema {
                file: file.to_string(),
                field,
            });
        }
        warnings.push(LoadWarning::ColumnFallback {
            file: file.to_string(),
            field: field.to_string(),
            column: index,
            header: headers.get(index).unwrap_or("").to_string(),
        });
        Ok(index)
    };

    // Positional fallbacks match the historical file layout: practice first,
    // unit second, activity last.
    let practice = resolve("practice", PRACTICE_SYNONYMS, lowered.first().map(|_| 0))?;
    let unit = resolve(
        "unit",
        UNIT_SYNONYMS,
        if lowered.len() > 1 { Some(1) } else { None },
    )?;
    let activity = resolve(
        "activity",
        ACTIVITY_SYNONYMS,
        lowered.len().checked_sub(1),
    )?;

    Ok(ColumnMap {
        practice,
        unit,
        activity,
    })
}

/// Trim a raw cell; the literal string `nan` (a pandas export artifact seen in
/// real grade files) normalizes to empty.
fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Parse one grade's CSV into normalized records.
///
/// Missing unit codes and empty activities degrade to empty values; only an
/// unresolvable required column or a malformed CSV stream is an error.
pub fn parse_grade_records<R: io::Read>(
    reader: R,
    grade: Grade,
    file: &str,
    params: &Params,
) -> Result<(Vec<CurriculumRecord>, Vec<LoadWarning>), MapError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| MapError::CsvParse {
            file: file.to_string(),
            message: e.to_string(),
        })?
        .clone();

    let mut warnings = Vec::new();
    let columns = resolve_columns(&headers, file, params, &mut warnings)?;

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|e| MapError::CsvParse {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        let practice = clean_field(row.get(columns.practice).unwrap_or(""));
        let unit_raw = clean_field(row.get(columns.unit).unwrap_or(""));
        let activity = clean_field(row.get(columns.activity).unwrap_or(""));
        let (unit_code, unit_title) = split_unit_field(&unit_raw, params.code_range);
        records.push(CurriculumRecord {
            grade,
            practice,
            unit_code,
            unit_title,
            activity,
        });
    }
    Ok((records, warnings))
}

/// Default per-grade file layout: `<data_dir>/<label>_database.csv`.
pub fn default_grade_files(data_dir: &Path) -> Vec<(Grade, PathBuf)> {
    Grade::ALL
        .iter()
        .map(|&grade| {
            (
                grade,
                data_dir.join(format!("{}_database.csv", grade.label())),
            )
        })
        .collect()
}

/// Load a JSON manifest mapping grade labels to CSV paths.
pub fn load_manifest(path: &Path) -> Result<Vec<(Grade, PathBuf)>, MapError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| MapError::Manifest(format!("{}: {}", path.display(), e)))?;
    let entries: std::collections::BTreeMap<String, PathBuf> = serde_json::from_str(&data)
        .map_err(|e| MapError::Manifest(format!("{}: {}", path.display(), e)))?;
    let mut files = Vec::with_capacity(entries.len());
    for (label, file) in entries {
        let grade = Grade::from_label(&label).ok_or(MapError::UnknownGrade(label))?;
        files.push((grade, file));
    }
    files.sort_by_key(|(grade, _)| *grade);
    Ok(files)
}

/// Load every available grade file into one record snapshot.
///
/// A missing or unreadable file excludes that grade and records a warning; an
/// unresolvable required column is fatal for the whole load.
pub fn load_records(files: &[(Grade, PathBuf)], params: &Params) -> Result<LoadReport, MapError> {
    let mut report = LoadReport::default();
    for (grade, path) in files {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => {
                report.warnings.push(LoadWarning::MissingFile {
                    grade: *grade,
                    path: path.clone(),
                });
                continue;
            }
        };
        let label = path.display().to_string();
        let (records, warnings) = parse_grade_records(file, *grade, &label, params)?;
        report.records.extend(records);
        report.warnings.extend(warnings);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(csv_text: &str, grade: Grade, params: &Params) -> (Vec<CurriculumRecord>, Vec<LoadWarning>) {
        parse_grade_records(csv_text.as_bytes(), grade, "test.csv", params).expect("parse")
    }

    #[test]
    fn test_synonym_headers_case_insensitive() {
        let text = "NGSS Practice,Unit,Activity/Assessment\nP1,A1: Forces,Lab 1\n";
        let (records, warnings) = parse(text, Grade::Fourth, &Params::default());
        assert!(warnings.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].practice, "P1");
        assert_eq!(records[0].unit_code, Some(UnitCode(1)));
        assert_eq!(records[0].unit_title, "Forces");
        assert_eq!(records[0].activity, "Lab 1");
    }

    #[test]
    fn test_positional_fallback_records_warning() {
        let text = "Standard,Topic,Work\nP1,A2: Matter,Worksheet\n";
        let (records, warnings) = parse(text, Grade::Sixth, &Params::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].practice, "P1");
        assert_eq!(records[0].unit_title, "Matter");
        assert_eq!(records[0].activity, "Worksheet");
        // One fallback per unresolved field, each naming the column it used.
        assert_eq!(warnings.len(), 3);
        assert!(matches!(
            &warnings[0],
            LoadWarning::ColumnFallback { column: 0, .. }
        ));
        assert!(matches!(
            &warnings[2],
            LoadWarning::ColumnFallback { column: 2, .. }
        ));
    }

    #[test]
    fn test_strict_headers_rejects_fallback() {
        let text = "Standard,Topic,Work\nP1,A2: Matter,Worksheet\n";
        let params = Params {
            strict_headers: true,
            ..Params::default()
        };
        let err = parse_grade_records(text.as_bytes(), Grade::Sixth, "test.csv", &params)
            .expect_err("fallback should be rejected");
        assert!(matches!(err, MapError::Schema { field: "practice", .. }));
    }

    #[test]
    fn test_single_column_file_missing_unit_is_schema_error() {
        let text = "Activity\nLab 1\n";
        let err = parse_grade_records(text.as_bytes(), Grade::Fourth, "test.csv", &Params::default())
            .expect_err("no unit column available");
        assert!(matches!(err, MapError::Schema { field: "unit", .. }));
    }

    #[test]
    fn test_nan_cells_normalize_to_empty() {
        let text = "Practice,Unit,Activity\nP1,A1: Forces,nan\n";
        let (records, _) = parse(text, Grade::Fourth, &Params::default());
        assert_eq!(records[0].activity, "");
    }

    #[test]
    fn test_ragged_rows_degrade_to_empty_fields() {
        let text = "Practice,Unit,Activity\nP1,A1: Forces\n";
        let (records, _) = parse(text, Grade::Fourth, &Params::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit_code, Some(UnitCode(1)));
        assert_eq!(records[0].activity, "");
    }

    #[test]
    fn test_missing_file_is_warning_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fourth = dir.path().join("4th_database.csv");
        let mut file = File::create(&fourth).expect("create");
        writeln!(file, "Practice,Unit,Activity").expect("write");
        writeln!(file, "P1,A1: Forces,Lab 1").expect("write");

        let files = vec![
            (Grade::Fourth, fourth),
            (Grade::Sixth, dir.path().join("6th_database.csv")),
        ];
        let report = load_records(&files, &Params::default()).expect("load");
        assert_eq!(report.records.len(), 1);
        assert!(report.records.iter().all(|r| r.grade == Grade::Fourth));
        assert_eq!(
            report.warnings,
            vec![LoadWarning::MissingFile {
                grade: Grade::Sixth,
                path: dir.path().join("6th_database.csv"),
            }]
        );
    }

    #[test]
    fn test_report_practices_sorted_distinct() {
        let text = "Practice,Unit,Activity\nP2,A1,x\nP1,A1,y\nP2,A2,z\n";
        let (records, _) = parse(text, Grade::Fourth, &Params::default());
        let report = LoadReport {
            records,
            warnings: Vec::new(),
        };
        assert_eq!(report.practices(), vec!["P1".to_string(), "P2".to_string()]);
    }

    #[test]
    fn test_grade_labels_round_trip() {
        for grade in Grade::ALL {
            assert_eq!(Grade::from_label(grade.label()), Some(grade));
        }
        assert_eq!(Grade::from_label("10TH"), Some(Grade::Tenth));
        assert_eq!(Grade::from_label("5th"), None);
    }

    #[test]
    fn test_manifest_unknown_grade_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join("map.json");
        std::fs::write(&manifest, r#"{"4th": "a.csv", "5th": "b.csv"}"#).expect("write");
        let err = load_manifest(&manifest).expect_err("5th is not a known grade");
        assert!(matches!(err, MapError::UnknownGrade(label) if label == "5th"));
    }
}
