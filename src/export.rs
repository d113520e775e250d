//! Spreadsheet export of HR reports: averages as an Excel workbook, raw
//! responses as CSV.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rust_xlsxwriter::Workbook;

use crate::db::{Response, COLUMNS};
use crate::report::QuestionMeans;

const QUESTION_COLUMNS: [&str; 6] = [
    "stress_q1",
    "stress_q2",
    "stress_q3",
    "motivation_q1",
    "motivation_q2",
    "motivation_q3",
];

pub const ALL_DEPARTMENTS_SHEET: &str = "Avg_by_department";

/// Excel caps sheet names at 31 characters.
const MAX_SHEET_NAME: usize = 31;

/// File name used when no output path is given.
pub fn default_file_name(department: Option<&str>, raw: bool) -> PathBuf {
    match (department, raw) {
        (None, false) => PathBuf::from("wellbeing_avg_by_department.xlsx"),
        (None, true) => PathBuf::from("wellbeing_responses.csv"),
        (Some(dept), false) => PathBuf::from(format!("wellbeing_{}_report.xlsx", slug(dept))),
        (Some(dept), true) => PathBuf::from(format!("wellbeing_{}_responses.csv", slug(dept))),
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Worksheet name for an averages export: one sheet for all departments,
/// or `<department>_report` for a single one.
pub fn sheet_name(department: Option<&str>) -> String {
    match department {
        None => ALL_DEPARTMENTS_SHEET.to_string(),
        Some(dept) => sanitize_sheet_name(&format!("{}_report", dept)),
    }
}

fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .take(MAX_SHEET_NAME)
        .collect();

    cleaned.trim_matches('\'').to_string()
}

/// One row per group with the mean of each sub-question. The label column
/// is only written when `label_header` is given.
pub fn question_means_workbook(
    sheet: &str,
    label_header: Option<&str>,
    rows: &[QuestionMeans],
) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet)
        .with_context(|| format!("Invalid worksheet name {:?}", sheet))?;

    let mut header: Vec<&str> = label_header.into_iter().collect();
    header.extend(QUESTION_COLUMNS);
    for (col, title) in header.iter().enumerate() {
        worksheet.write_string(0, col as u16, *title)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let line = i as u32 + 1;
        let mut col: u16 = 0;
        if label_header.is_some() {
            worksheet.write_string(line, col, &row.label)?;
            col += 1;
        }
        for value in row.stress.iter().chain(row.motivation.iter()) {
            worksheet.write_number(line, col, *value)?;
            col += 1;
        }
    }

    Ok(workbook)
}

pub fn save_workbook(workbook: &mut Workbook, path: &Path) -> Result<()> {
    workbook
        .save(path)
        .with_context(|| format!("Failed to write to file {}", path.display()))
}

/// Raw responses with the full table header. Unknown timestamps are left
/// blank.
pub fn write_responses<W: Write>(out: W, responses: &[&Response]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COLUMNS)?;

    for r in responses {
        let mut fields = vec![
            r.id.to_string(),
            r.timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            r.department.clone(),
        ];
        fields.extend(r.ratings.stress.iter().chain(r.ratings.motivation.iter()).map(i64::to_string));
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_file(path: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write(&mut out).with_context(|| format!("Failed to write to file {}", path.display()))?;
    out.flush()
        .with_context(|| format!("Failed to write to file {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Ratings;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn means(label: &str) -> QuestionMeans {
        QuestionMeans {
            label: label.to_string(),
            stress: [1.0, 2.5, 3.33],
            motivation: [10.0, 0.0, 7.25],
        }
    }

    #[test]
    fn test_sheet_names() {
        assert_eq!(sheet_name(None), "Avg_by_department");
        assert_eq!(sheet_name(Some("OVA")), "OVA_report");

        let long = sheet_name(Some("Documentation, Pricing & Legal"));
        assert_eq!(long, "Documentation, Pricing & Legal_");
        assert_eq!(long.chars().count(), 31);

        assert_eq!(sheet_name(Some("R&D: EU/US [x]")), "R&D_ EU_US _x__report");
    }

    #[test]
    fn test_workbook_for_all_departments() {
        let mut workbook = question_means_workbook(
            &sheet_name(None),
            Some("department"),
            &[means("Documentation, Pricing & Legal"), means("OVA")],
        )
        .unwrap();

        assert_eq!(workbook.worksheet_from_index(0).unwrap().name(), "Avg_by_department");
        let bytes = workbook.save_to_buffer().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_workbook_for_long_department_name() {
        let sheet = sheet_name(Some("Documentation, Pricing & Legal"));
        let mut workbook =
            question_means_workbook(&sheet, None, &[means("Documentation, Pricing & Legal")]).unwrap();

        assert_eq!(workbook.worksheet_from_index(0).unwrap().name(), sheet);
        assert!(workbook.save_to_buffer().is_ok());
    }

    #[test]
    fn test_save_workbook() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(default_file_name(Some("OVA"), false));
        let mut workbook = question_means_workbook(&sheet_name(Some("OVA")), None, &[means("OVA")]).unwrap();

        save_workbook(&mut workbook, &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_raw_responses() {
        let known = Response {
            id: 3,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()),
            department: "Say \"hi\"".to_string(),
            ratings: Ratings::new([1, 2, 3], [4, 5, 6]),
        };
        let unknown = Response { id: 4, timestamp: None, ..known.clone() };

        let mut out = Vec::new();
        write_responses(&mut out, &[&known, &unknown]).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(lines[1], "3,2024-01-05T09:00:00Z,\"Say \"\"hi\"\"\",1,2,3,4,5,6");
        assert_eq!(lines[2], "4,,\"Say \"\"hi\"\"\",1,2,3,4,5,6");
    }

    #[test]
    fn test_write_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        write_file(&path, |out| write_responses(out, &[])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(default_file_name(None, false), PathBuf::from("wellbeing_avg_by_department.xlsx"));
        assert_eq!(default_file_name(None, true), PathBuf::from("wellbeing_responses.csv"));
        assert_eq!(
            default_file_name(Some("Finance & Accounting"), false),
            PathBuf::from("wellbeing_Finance___Accounting_report.xlsx")
        );
        assert_eq!(
            default_file_name(Some("Documentation, Pricing & Legal"), true),
            PathBuf::from("wellbeing_Documentation__Pricing___Legal_responses.csv")
        );
    }
}
