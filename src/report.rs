//! Nutrient reports: classified reading tables, descriptive statistics and
//! derived nutrient ratios, exported as a two-sheet spreadsheet.
//!
//! Report generation is a pure function of its input rows. The only state
//! involved is the read-only classifier.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{DocProperties, Format, Workbook, Worksheet};
use serde::Serialize;

use crate::classifier::{Nutrient, NutrientClassifier, NutrientLevel};
use crate::error::ReportError;
use crate::models::LabeledReading;

// ---

pub const DATA_SHEET: &str = "Data";
pub const STATS_SHEET: &str = "Stats";

/// Descriptive statistic names, in output order.
pub const STAT_LABELS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

const DATA_HEADERS: [&str; 9] = [
    "Timestamp", "Sensor", "Crop", "N", "P", "K", "N level", "P level", "K level",
];

/// Ratio rows appended to the statistics: (label, numerator, denominator).
/// The value lands in the numerator's column.
const RATIOS: [(&str, Nutrient, Nutrient); 3] = [
    ("N:P ratio", Nutrient::N, Nutrient::P),
    ("N:K ratio", Nutrient::N, Nutrient::K),
    ("P:K ratio", Nutrient::P, Nutrient::K),
];

/// Text written for NaN cells.
const NAN_MARKER: &str = "NaN";

const TIMESTAMP_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const TIMESTAMP_WIDTH: f64 = 20.0;

/// One classified reading in the report's data table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    // ---
    pub created_at: DateTime<Utc>,
    pub sensor_name: String,
    pub crop_name: String,
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub level_n: NutrientLevel,
    pub level_p: NutrientLevel,
    pub level_k: NutrientLevel,
}

/// A labeled row of the statistics table with one cell per nutrient
/// (N, P, K). `None` is a missing cell, `Some(NaN)` is an explicit NaN.
#[derive(Debug, Clone, Serialize)]
pub struct StatsRow {
    pub label: String,
    pub values: [Option<f64>; 3],
}

impl StatsRow {
    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        self.values[column(nutrient)]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsTable {
    pub rows: Vec<StatsRow>,
}

impl StatsTable {
    /// Look up a row by its label, e.g. `"mean"` or `"N:P ratio"`.
    pub fn row(&self, label: &str) -> Option<&StatsRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

/// A generated report, ready to be serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub table: Vec<ReportRow>,
    pub stats: StatsTable,
}

fn column(nutrient: Nutrient) -> usize {
    match nutrient {
        Nutrient::N => 0,
        Nutrient::P => 1,
        Nutrient::K => 2,
    }
}

/// Builds reports from range query results.
#[derive(Clone)]
pub struct ReportEngine {
    classifier: Arc<NutrientClassifier>,
}

impl ReportEngine {
    pub fn new(classifier: Arc<NutrientClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify every row and aggregate the statistics.
    pub fn generate(&self, rows: &[LabeledReading]) -> Result<Report, ReportError> {
        // ---
        let levels = self.classifier.classify_batch(rows)?;

        let table = rows
            .iter()
            .zip(levels)
            .map(|(row, level)| ReportRow {
                created_at: row.created_at,
                sensor_name: row.sensor_name.clone(),
                crop_name: row.crop_name.clone(),
                n: row.n,
                p: row.p,
                k: row.k,
                level_n: level.level_n,
                level_p: level.level_p,
                level_k: level.level_k,
            })
            .collect();

        let columns = Nutrient::ALL.map(|nutrient| {
            rows.iter()
                .map(|row| nutrient.value_of(row))
                .collect::<Vec<f64>>()
        });

        tracing::debug!("Generated report over {} row(s)", rows.len());
        Ok(Report {
            table,
            stats: compute_stats(&columns),
        })
    }
}

/// Descriptive statistics of one column, in [`STAT_LABELS`] order.
///
/// `std` is the sample standard deviation. Quantiles interpolate linearly
/// between the closest ranks. Undefined values (empty input, `std` of a
/// single value) are NaN.
pub fn describe(values: &[f64]) -> [f64; 8] {
    // ---
    let count = values.len();
    if count == 0 {
        return [0.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN];
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = count as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = if count < 2 {
        f64::NAN
    } else {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    };

    [
        n,
        mean,
        std,
        sorted[0],
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.50),
        quantile(&sorted, 0.75),
        sorted[count - 1],
    ]
}

/// Linear-interpolated quantile of non-empty sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    // ---
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `num / den`, with a zero denominator giving NaN rather than infinity.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

/// Statistics table for the N, P and K columns followed by the ratio rows.
pub fn compute_stats(columns: &[Vec<f64>; 3]) -> StatsTable {
    // ---
    let described = [
        describe(&columns[0]),
        describe(&columns[1]),
        describe(&columns[2]),
    ];

    let mut rows: Vec<StatsRow> = STAT_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| StatsRow {
            label: label.to_string(),
            values: [
                Some(described[0][i]),
                Some(described[1][i]),
                Some(described[2][i]),
            ],
        })
        .collect();

    let mean_idx = 1;
    for (label, num, den) in RATIOS {
        let mut values = [None; 3];
        values[column(num)] = Some(ratio(
            described[column(num)][mean_idx],
            described[column(den)][mean_idx],
        ));
        rows.push(StatsRow {
            label: label.to_string(),
            values,
        });
    }

    StatsTable { rows }
}

impl Report {
    /// Serialize as an `.xlsx` workbook with a "Data" and a "Stats" sheet.
    ///
    /// The workbook's creation time is the newest reading's timestamp (the
    /// Unix epoch for an empty report), so the same report always yields the
    /// same bytes.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, ReportError> {
        // ---
        let created = self
            .table
            .iter()
            .map(|row| row.created_at)
            .max()
            .unwrap_or_default();

        let mut workbook = Workbook::new();
        workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));
        let header = Format::new().set_bold();

        write_data_sheet(workbook.add_worksheet(), &self.table, &header)?;
        write_stats_sheet(workbook.add_worksheet(), &self.stats, &header)?;

        Ok(workbook.save_to_buffer()?)
    }
}

fn write_data_sheet(
    sheet: &mut Worksheet,
    table: &[ReportRow],
    header: &Format,
) -> Result<(), ReportError> {
    // ---
    sheet.set_name(DATA_SHEET)?;
    let timestamp = Format::new().set_num_format(TIMESTAMP_FORMAT);
    for (col, title) in DATA_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    for (i, row) in table.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_datetime_with_format(r, 0, row.created_at.naive_utc(), &timestamp)?;
        sheet.write_string(r, 1, row.sensor_name.as_str())?;
        sheet.write_string(r, 2, row.crop_name.as_str())?;
        sheet.write_number(r, 3, row.n)?;
        sheet.write_number(r, 4, row.p)?;
        sheet.write_number(r, 5, row.k)?;
        sheet.write_string(r, 6, row.level_n.as_str())?;
        sheet.write_string(r, 7, row.level_p.as_str())?;
        sheet.write_string(r, 8, row.level_k.as_str())?;
    }

    sheet.autofit();
    sheet.set_column_width(0, TIMESTAMP_WIDTH)?;
    Ok(())
}

fn write_stats_sheet(
    sheet: &mut Worksheet,
    stats: &StatsTable,
    header: &Format,
) -> Result<(), ReportError> {
    // ---
    sheet.set_name(STATS_SHEET)?;
    for nutrient in Nutrient::ALL {
        let col = column(nutrient) as u16 + 1;
        sheet.write_string_with_format(0, col, nutrient.symbol(), header)?;
    }

    for (i, row) in stats.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string_with_format(r, 0, row.label.as_str(), header)?;

        for (c, value) in row.values.iter().enumerate() {
            let col = c as u16 + 1;
            match value {
                None => {}
                Some(v) if v.is_nan() => {
                    sheet.write_string(r, col, NAN_MARKER)?;
                }
                Some(v) => {
                    sheet.write_number(r, col, *v)?;
                }
            }
        }
    }

    sheet.autofit();
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::io::{Cursor, Read};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_describe_matches_reference_values() {
        // ---
        let stats = describe(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(stats[0], 4.0);
        assert_close(stats[1], 2.5);
        assert_close(stats[2], 1.2909944487358056);
        assert_eq!(stats[3], 1.0);
        assert_close(stats[4], 1.75);
        assert_close(stats[5], 2.5);
        assert_close(stats[6], 3.25);
        assert_eq!(stats[7], 4.0);
    }

    #[test]
    fn test_describe_degenerate_inputs() {
        // ---
        let empty = describe(&[]);
        assert_eq!(empty[0], 0.0);
        assert!(empty[1..].iter().all(|v| v.is_nan()));

        let single = describe(&[7.5]);
        assert_eq!(single[0], 1.0);
        assert_eq!(single[1], 7.5);
        assert!(single[2].is_nan());
        assert_eq!(single[3], 7.5);
        assert_eq!(single[5], 7.5);
        assert_eq!(single[7], 7.5);
    }

    #[test]
    fn test_ratio_rows() {
        // ---
        // means: N = 40, P = 0, K = 20
        let stats = compute_stats(&[vec![30.0, 50.0], vec![0.0, 0.0], vec![10.0, 30.0]]);

        let np = stats.row("N:P ratio").unwrap();
        assert!(np.get(Nutrient::N).unwrap().is_nan());
        assert_eq!(np.get(Nutrient::P), None);
        assert_eq!(np.get(Nutrient::K), None);

        let nk = stats.row("N:K ratio").unwrap();
        assert_eq!(nk.get(Nutrient::N), Some(2.0));
        assert_eq!(nk.get(Nutrient::P), None);
        assert_eq!(nk.get(Nutrient::K), None);

        let pk = stats.row("P:K ratio").unwrap();
        assert_eq!(pk.get(Nutrient::N), None);
        assert_eq!(pk.get(Nutrient::P), Some(0.0));
        assert_eq!(pk.get(Nutrient::K), None);
    }

    #[test]
    fn test_stats_row_order() {
        // ---
        let stats = compute_stats(&[vec![1.0], vec![2.0], vec![3.0]]);
        let labels: Vec<&str> = stats.rows.iter().map(|r| r.label.as_str()).collect();

        assert_eq!(
            labels,
            [
                "count", "mean", "std", "min", "25%", "50%", "75%", "max",
                "N:P ratio", "N:K ratio", "P:K ratio"
            ]
        );
    }

    #[test]
    fn test_ratio_never_infinite() {
        // ---
        assert!(ratio(40.0, 0.0).is_nan());
        assert!(ratio(0.0, 0.0).is_nan());
        assert!(ratio(-1.0, 0.0).is_nan());
        assert_eq!(ratio(9.0, 3.0), 3.0);
    }

    fn sample_report() -> Report {
        // ---
        let row = |hour, n, p, k| ReportRow {
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap(),
            sensor_name: "field-1".to_string(),
            crop_name: "Rice".to_string(),
            n,
            p,
            k,
            level_n: NutrientLevel::Low,
            level_p: NutrientLevel::Okay,
            level_k: NutrientLevel::High,
        };
        let table = vec![row(6, 30.0, 0.0, 10.0), row(12, 50.0, 0.0, 30.0)];
        let stats = compute_stats(&[vec![30.0, 50.0], vec![0.0, 0.0], vec![10.0, 30.0]]);
        Report { table, stats }
    }

    /// Read one part of an `.xlsx` package as text.
    fn xlsx_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    fn shared_strings(xml: &str) -> Vec<String> {
        // ---
        xml.split("<si>")
            .skip(1)
            .map(|si| {
                let t = &si[si.find("<t").unwrap()..];
                let start = t.find('>').unwrap() + 1;
                let end = t.find("</t>").unwrap();
                t[start..end].to_string()
            })
            .collect()
    }

    /// Text of a cell, resolving shared strings; `None` when the cell is blank.
    fn cell(sheet: &str, strings: &[String], r: &str) -> Option<String> {
        // ---
        let open = format!("<c r=\"{r}\"");
        let mut rest = sheet;
        while let Some(i) = rest.find(&open) {
            let tail = &rest[i + open.len()..];
            if tail.starts_with(' ') || tail.starts_with('>') {
                let element = &tail[..tail.find("</c>")?];
                let start = element.find("<v>")? + 3;
                let value = &element[start..element.find("</v>")?];
                if element.contains("t=\"s\"") {
                    return Some(strings[value.parse::<usize>().unwrap()].clone());
                }
                return Some(value.to_string());
            }
            rest = tail;
        }
        None
    }

    #[test]
    fn test_xlsx_has_data_and_stats_sheets() {
        // ---
        let bytes = sample_report().to_xlsx().unwrap();
        let workbook = xlsx_part(&bytes, "xl/workbook.xml");

        assert_eq!(workbook.matches("<sheet name=").count(), 2);
        let data = workbook.find("<sheet name=\"Data\"").unwrap();
        let stats = workbook.find("<sheet name=\"Stats\"").unwrap();
        assert!(data < stats);
    }

    #[test]
    fn test_xlsx_stats_sheet_layout() {
        // ---
        let bytes = sample_report().to_xlsx().unwrap();
        let strings = shared_strings(&xlsx_part(&bytes, "xl/sharedStrings.xml"));
        let sheet = xlsx_part(&bytes, "xl/worksheets/sheet2.xml");
        let at = |r| cell(&sheet, &strings, r);

        // header row, then one labeled row per statistic
        assert_eq!(at("A1"), None);
        assert_eq!(at("B1").as_deref(), Some("N"));
        assert_eq!(at("D1").as_deref(), Some("K"));
        assert_eq!(at("A2").as_deref(), Some("count"));
        assert_eq!(at("A9").as_deref(), Some("max"));
        assert_eq!(at("B2").as_deref(), Some("2"));

        // N:P over a zero P mean
        assert_eq!(at("A10").as_deref(), Some("N:P ratio"));
        assert_eq!(at("B10").as_deref(), Some("NaN"));
        assert_eq!(at("C10"), None);
        assert_eq!(at("D10"), None);

        assert_eq!(at("A11").as_deref(), Some("N:K ratio"));
        assert_eq!(at("B11").as_deref(), Some("2"));
        assert_eq!(at("A12").as_deref(), Some("P:K ratio"));
        assert_eq!(at("B12"), None);
        assert_eq!(at("C12").as_deref(), Some("0"));
    }

    #[test]
    fn test_xlsx_timestamps_are_date_cells() {
        // ---
        let bytes = sample_report().to_xlsx().unwrap();
        let strings = shared_strings(&xlsx_part(&bytes, "xl/sharedStrings.xml"));
        let sheet = xlsx_part(&bytes, "xl/worksheets/sheet1.xml");

        assert_eq!(cell(&sheet, &strings, "A1").as_deref(), Some("Timestamp"));
        // 2025-03-01 12:00 as an Excel serial date
        let serial: f64 = cell(&sheet, &strings, "A3").unwrap().parse().unwrap();
        assert_close(serial, 45717.5);
        assert_eq!(cell(&sheet, &strings, "G2").as_deref(), Some("Low"));
    }

    #[test]
    fn test_xlsx_bytes_are_stable() {
        // ---
        let report = sample_report();
        let first = report.to_xlsx().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = report.to_xlsx().unwrap();

        assert_eq!(first, second);
        let core = xlsx_part(&first, "docProps/core.xml");
        assert!(core.contains("2025-03-01T12:00:00Z"), "{core}");

        let empty = Report {
            table: Vec::new(),
            stats: compute_stats(&[Vec::new(), Vec::new(), Vec::new()]),
        };
        let core = xlsx_part(&empty.to_xlsx().unwrap(), "docProps/core.xml");
        assert!(core.contains("1970-01-01T00:00:00Z"), "{core}");
    }

    proptest! {
        #[test]
        fn prop_describe_is_ordered(values in prop::collection::vec(0.0f64..1000.0, 1..64)) {
            let s = describe(&values);

            prop_assert_eq!(s[0], values.len() as f64);
            let eps = 1e-9;
            prop_assert!(s[3] <= s[4] + eps && s[4] <= s[5] + eps);
            prop_assert!(s[5] <= s[6] + eps && s[6] <= s[7] + eps);
            prop_assert!(s[3] <= s[1] + 1e-9 && s[1] <= s[7] + 1e-9);
        }

        #[test]
        fn prop_ratio_is_finite_or_nan(num in 0.0f64..1000.0, den in 0.0f64..1000.0) {
            let r = ratio(num, den);
            prop_assert!(r.is_finite() || r.is_nan());
        }
    }
}
