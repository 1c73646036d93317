//! Parsing of the internal-marks result grid.
//!
//! The grid renders two header rows. The first carries coarse labels
//! ("MID-I", "FinalMarks") and the second the specific ones
//! ("Assignment-1(5m)"); a column is only named in whichever row populates
//! it, so the two rows are merged before any data row is read.

use std::{fmt, str::FromStr, sync::LazyLock};

use indexmap::IndexMap;
use log::warn;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::text_manipulators::{
    NOT_AVAILABLE, child_elements, extract_trimmed_text, is_blank_cell, normalize_cell,
};

pub const RESULT_TABLE_ID: &str = "Stud_cpBody_gridSem1";

/// Running number, subject code and subject name precede the mark columns.
const LEADING_COLUMNS: usize = 3;
const SUBJECT_CODE_CELL: usize = 1;
const SUBJECT_NAME_CELL: usize = 2;

pub const PARSE_FAILED_CODES: [&str; 2] = ["DUM1", "DUM2"];
pub const NETWORK_ERROR_CODE: &str = "ERR";

// html5ever inserts a tbody under the grid, the raw markup has none.
static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#Stud_cpBody_gridSem1 > tr, #Stud_cpBody_gridSem1 > tbody > tr").unwrap()
});

const CELL_TAGS: &[&str] = &["td", "th"];

/// One subject's row of the result grid.
///
/// `fields` is keyed by the merged column header; its key set depends on the
/// exam period that was queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub subject_code: String,
    pub subject_name: String,
    pub fields: IndexMap<String, String>,
}

impl SubjectRecord {
    fn sentinel(code: &str, name: &str) -> Self {
        Self {
            subject_code: code.to_string(),
            subject_name: name.to_string(),
            fields: IndexMap::new(),
        }
    }

    /// Returned when the page did not render a result grid.
    pub fn parse_failed_placeholders() -> Vec<SubjectRecord> {
        vec![
            Self::sentinel(PARSE_FAILED_CODES[0], "Parsing Failed - Dummy Subject 1"),
            Self::sentinel(PARSE_FAILED_CODES[1], "Parsing Failed - Dummy Subject 2"),
        ]
    }

    /// Returned when the portal could not be reached.
    pub fn network_error_placeholder() -> Vec<SubjectRecord> {
        vec![Self::sentinel(
            NETWORK_ERROR_CODE,
            "Network Error - Dummy Subject",
        )]
    }

    pub fn is_placeholder(&self) -> bool {
        self.subject_code == NETWORK_ERROR_CODE
            || PARSE_FAILED_CODES.contains(&self.subject_code.as_str())
    }

    /// Fields whose header names a final mark and whose value is real.
    pub fn highlighted_final_fields(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .filter(|(header, value)| is_final_marks_header(header) && has_mark(value))
            .map(|(header, value)| (header.as_str(), value.as_str()))
            .collect()
    }
}

/// True when every record is a sentinel rather than real data.
pub fn is_placeholder_result(records: &[SubjectRecord]) -> bool {
    records.iter().all(SubjectRecord::is_placeholder)
}

/// Resolved header names, one per mark column.
///
/// An empty name marks a column that neither header row labels; it emits no
/// field but keeps its position so later columns read the right cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeaders {
    names: Vec<String>,
}

impl ColumnHeaders {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(column offset, header)` for every named column.
    pub fn resolved(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (i, name.as_str()))
    }
}

/// Merges the two header rows. The second row wins when it is populated,
/// then the first row, else the column stays unnamed.
pub fn merge_headers<S: AsRef<str>>(first_row: &[S], second_row: &[S]) -> ColumnHeaders {
    let width = first_row.len().max(second_row.len());
    let populated = |row: &[S], i: usize| {
        row.get(i)
            .map(|cell| cell.as_ref().trim())
            .filter(|cell| !is_blank_cell(cell))
            .map(str::to_string)
    };

    let names = (0..width)
        .map(|i| {
            populated(second_row, i)
                .or_else(|| populated(first_row, i))
                .unwrap_or_default()
        })
        .collect();

    ColumnHeaders { names }
}

fn header_texts(row: ElementRef) -> Vec<String> {
    child_elements(row, CELL_TAGS)
        .into_iter()
        .skip(LEADING_COLUMNS)
        .map(extract_trimmed_text)
        .collect()
}

fn parse_data_row(row: ElementRef, headers: &ColumnHeaders) -> SubjectRecord {
    let cells = child_elements(row, CELL_TAGS);
    let cell_text = |index: usize| {
        cells
            .get(index)
            .map(|cell| normalize_cell(&extract_trimmed_text(*cell)))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    let fields = headers
        .resolved()
        .map(|(i, header)| (header.to_string(), cell_text(LEADING_COLUMNS + i)))
        .collect();

    SubjectRecord {
        subject_code: cell_text(SUBJECT_CODE_CELL),
        subject_name: cell_text(SUBJECT_NAME_CELL),
        fields,
    }
}

/// Decodes the result grid of a marks page into one record per subject.
///
/// Fewer than three grid rows means the page rendered no result table, and
/// the parse-failed placeholders are returned instead.
pub fn parse_marks_table(html: &str) -> Vec<SubjectRecord> {
    let document = Html::parse_document(html);
    let rows: Vec<ElementRef> = document.select(&ROW_SELECTOR).collect();

    if rows.len() < 3 {
        warn!(
            "result grid #{} has {} rows, expected at least 3; returning placeholders",
            RESULT_TABLE_ID,
            rows.len()
        );
        return SubjectRecord::parse_failed_placeholders();
    }

    let headers = merge_headers(&header_texts(rows[0]), &header_texts(rows[1]));

    rows[2..]
        .iter()
        .map(|row| parse_data_row(*row, &headers))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamPeriod {
    First,
    Second,
}

impl ExamPeriod {
    /// Value of the portal's exam-code dropdown.
    pub fn selector(&self) -> &'static str {
        match self {
            ExamPeriod::First => "1",
            ExamPeriod::Second => "2",
        }
    }

    /// Label the grid uses in the headers of this period's mid-term column.
    pub fn label(&self) -> &'static str {
        match self {
            ExamPeriod::First => "MID-I",
            ExamPeriod::Second => "MID-II",
        }
    }
}

impl fmt::Display for ExamPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ExamPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(ExamPeriod::First),
            "2" => Ok(ExamPeriod::Second),
            other => Err(anyhow::anyhow!(
                "exam period must be \"1\" or \"2\", got {:?}",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Semester(u8);

impl Semester {
    pub const MAX: u8 = 8;

    pub fn new(number: u8) -> anyhow::Result<Self> {
        if (1..=Self::MAX).contains(&number) {
            Ok(Self(number))
        } else {
            Err(anyhow::anyhow!(
                "semester must be between 1 and {}, got {}",
                Self::MAX,
                number
            ))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn selector(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Semester {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s.trim().parse::<u8>()?;
        Semester::new(number)
    }
}

/// The mark shown for a subject, and whether it is the final (consolidated)
/// mark rather than a single mid-term's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveMark {
    pub value: String,
    pub is_final: bool,
}

fn is_final_marks_header(header: &str) -> bool {
    header.to_lowercase().contains("finalmarks")
}

fn has_mark(value: &str) -> bool {
    value != NOT_AVAILABLE && !is_blank_cell(value)
}

/// Picks the mark to display for `record`:
/// 1. second period only: a populated "finalmarks" column (flagged final),
/// 2. the first column whose header contains the period's label,
/// 3. the last column.
pub fn effective_mark(record: &SubjectRecord, exam_period: ExamPeriod) -> EffectiveMark {
    if exam_period == ExamPeriod::Second {
        let final_marks = record
            .fields
            .iter()
            .find(|(header, _)| is_final_marks_header(header));
        if let Some((_, value)) = final_marks {
            if has_mark(value) {
                return EffectiveMark {
                    value: value.clone(),
                    is_final: true,
                };
            }
        }
    }

    let value = record
        .fields
        .iter()
        .find(|(header, _)| header.contains(exam_period.label()))
        .or_else(|| record.fields.last())
        .map(|(_, value)| value.clone())
        // Parsed rows are already normalised; records built by hand may not be.
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    EffectiveMark {
        value,
        is_final: false,
    }
}
