//! Clinical record lookup over a small in-memory dataset.

use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;

/// One chart entry. Field names vary per entry; only `Date` is always present.
#[derive(Debug, Clone, Serialize)]
pub struct ChartEntry {
    fields: Vec<(String, String)>,
}

impl ChartEntry {
    pub fn new(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn date(&self) -> Option<&str> {
        self.get("Date")
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    fn parsed_date(&self) -> Option<NaiveDate> {
        self.date()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicalRecord {
    pub study_id: u32,
    pub patient_mrn: String,
    pub date: String,
    pub modality: String,
    pub charts: Vec<ChartEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    StudyId,
    PatientMrn,
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Study ID" | "study_id" | "study" => Ok(SearchKind::StudyId),
            "Patient MRN" | "patient_mrn" | "mrn" => Ok(SearchKind::PatientMrn),
            other => Err(format!("Unknown search kind: {other}")),
        }
    }
}

/// Tabular search result. Missing cells are `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RecordTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    fn from_keyed_rows(rows: Vec<Vec<(String, String)>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for (key, _) in row {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        row.iter()
                            .find(|(k, _)| k == column)
                            .map(|(_, v)| v.clone())
                    })
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }
}

pub struct RecordStore {
    records: Vec<ClinicalRecord>,
}

impl RecordStore {
    pub fn new(records: Vec<ClinicalRecord>) -> Self {
        Self { records }
    }

    pub fn samples() -> Self {
        Self::new(sample_records())
    }

    pub fn search(&self, kind: SearchKind, query: &str) -> RecordTable {
        let needle = query.trim().to_lowercase();
        match kind {
            SearchKind::StudyId => {
                let rows: Vec<Vec<(String, String)>> = self
                    .records
                    .iter()
                    .filter(|r| r.study_id.to_string().to_lowercase().contains(&needle))
                    .map(|r| {
                        vec![
                            ("Study ID".to_string(), r.study_id.to_string()),
                            ("Patient MRN".to_string(), r.patient_mrn.clone()),
                            ("Date".to_string(), r.date.clone()),
                            ("Modality".to_string(), r.modality.clone()),
                        ]
                    })
                    .collect();
                RecordTable::from_keyed_rows(rows)
            }
            SearchKind::PatientMrn => {
                let rows: Vec<Vec<(String, String)>> = self
                    .records
                    .iter()
                    .filter(|r| r.patient_mrn.to_lowercase().contains(&needle))
                    .flat_map(|r| {
                        r.charts.iter().map(move |entry| {
                            let mut row = vec![("Patient MRN".to_string(), r.patient_mrn.clone())];
                            row.extend(entry.fields().iter().cloned());
                            row
                        })
                    })
                    .collect();
                RecordTable::from_keyed_rows(rows)
            }
        }
    }

    /// Search with a free-form kind label; an unrecognised kind yields an empty table.
    pub fn search_by_label(&self, kind: &str, query: &str) -> RecordTable {
        match kind.parse::<SearchKind>() {
            Ok(kind) => self.search(kind, query),
            Err(_) => RecordTable::default(),
        }
    }

    pub fn by_study(&self, study_id: u32) -> Option<&ClinicalRecord> {
        self.records.iter().find(|r| r.study_id == study_id)
    }

    /// Markdown clinical history for a study, newest entry first.
    pub fn chart_markdown(&self, study_id: u32) -> Option<String> {
        let record = self.by_study(study_id)?;

        let mut entries: Vec<&ChartEntry> = record.charts.iter().collect();
        entries.sort_by(|a, b| b.parsed_date().cmp(&a.parsed_date()));

        let mut doc = format!(
            "# Clinical History\n\n**Patient MRN:** {}  \n**Study ID:** {}  \n**Modality:** {}\n",
            record.patient_mrn, record.study_id, record.modality
        );
        for entry in entries {
            doc.push_str(&format!("\n## {}\n", entry.date().unwrap_or("Undated")));
            for (key, value) in entry.fields() {
                if key == "Date" || value.trim().is_empty() {
                    continue;
                }
                doc.push_str(&format!("- **{}:** {}\n", field_label(key), value.trim()));
            }
        }
        Some(doc)
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::samples()
    }
}

/// `physical_exam` -> `Physical Exam`
fn field_label(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sample_records() -> Vec<ClinicalRecord> {
    vec![
        ClinicalRecord {
            study_id: 101,
            patient_mrn: "101040".to_string(),
            date: "2024-03-01".to_string(),
            modality: "Chest X-Ray".to_string(),
            charts: vec![
                ChartEntry::new(&[
                    ("Date", "2024-02-15"),
                    ("Reason", "Routine annual physical exam"),
                    ("History", "No complaints. Patient in good overall health."),
                    ("Vitals", "BP: 118/76, HR: 72 bpm, Temp: 98.6°F"),
                    ("physical_exam", "Clear lung sounds, heart sounds normal."),
                    ("assessment", "Healthy adult, routine screening only."),
                    ("Plan", "Continue regular follow-up."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2024-01-10"),
                    ("Reason", "Persistent cough lasting over 2 weeks"),
                    ("History", "Dry cough, no fever, occasional wheezing."),
                    ("Vitals", "BP: 120/80, HR: 78 bpm, Temp: 99°F"),
                    ("Diagnosis", "Mild bronchitis"),
                    ("Treatment", "Prescribed antibiotics for 7 days, advised increased fluid intake."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2023-12-20"),
                    ("Reason", "Chest discomfort during exercise"),
                    ("History", "Brief episodes of chest tightness, relieved by rest."),
                    ("Vitals", "BP: 125/82, HR: 70 bpm, Temp: 98.7°F"),
                    ("tests", "Normal ECG"),
                    ("assessment", "Likely musculoskeletal in nature."),
                    ("Recommendations", "Recommended ibuprofen and follow-up in one month if symptoms persist."),
                ]),
            ],
        },
        ClinicalRecord {
            study_id: 102,
            patient_mrn: "102040".to_string(),
            date: "2024-03-01".to_string(),
            modality: "Chest X-Ray".to_string(),
            charts: vec![
                ChartEntry::new(&[
                    ("Date", "2024-02-10"),
                    ("Reason", "Shortness of breath on exertion"),
                    ("History", "Fatigue and mild leg swelling."),
                    ("Vitals", "BP: 140/90, HR: 88 bpm, Temp: 98.4°F"),
                    ("Diagnosis", "Early congestive heart failure"),
                    ("Treatment", "Initiated diuretic therapy, recommended lifestyle modifications including sodium restriction."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2024-01-05"),
                    ("Reason", "Follow-up cardiovascular assessment"),
                    ("History", "Improvement in symptoms, no significant dyspnea."),
                    ("Vitals", "BP: 125/80, HR: 70 bpm, Temp: 98.5°F"),
                    ("Assessment", "Stable heart function."),
                    ("Plan", "Continue medications, schedule echocardiogram in six months."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2023-12-20"),
                    ("Reason", "Annual cardiovascular screening"),
                    ("History", "Family history of heart disease, patient asymptomatic."),
                    ("Vitals", "BP: 130/85, HR: 68 bpm, Temp: 98.5°F"),
                    ("Findings", "Slight increase in heart size noted on imaging"),
                    ("Recommendations", "Annual imaging follow-up, monitor closely for symptom changes."),
                ]),
            ],
        },
        ClinicalRecord {
            study_id: 103,
            patient_mrn: "103010".to_string(),
            date: "2024-03-01".to_string(),
            modality: "Chest X-Ray".to_string(),
            charts: vec![
                ChartEntry::new(&[
                    ("Date", "2024-02-20"),
                    ("Reason", "Persistent cough and fever lasting 5 days"),
                    ("History", "Productive cough with yellow sputum, fever peaking at 101°F."),
                    ("Vitals", "BP: 122/78, HR: 90 bpm, Temp: 101°F"),
                    ("Diagnosis", "Early pneumonia"),
                    ("Treatment", "Initiated broad-spectrum antibiotics for 10 days, hydration advised."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2024-02-01"),
                    ("Reason", "Routine respiratory follow-up"),
                    ("History", "Patient recovered from previous cold, no current respiratory distress."),
                    ("Vitals", "BP: 118/78, HR: 72 bpm, Temp: 98.4°F"),
                    ("assessment", "Stable respiratory status."),
                    ("Plan", "Continue routine monitoring."),
                ]),
                ChartEntry::new(&[
                    ("Date", "2023-12-20"),
                    ("Reason", "Cold symptoms"),
                    ("History", "Symptoms of nasal congestion, mild sore throat."),
                    ("Vitals", "BP: 119/78, HR: 74 bpm, Temp: 99.1°F"),
                    ("Diagnosis", "Viral upper respiratory infection (URI)"),
                    ("Management", "Advised rest, increased fluid intake, and symptomatic management with over-the-counter remedies."),
                ]),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mrn_search_flattens_chart_entries() {
        let store = RecordStore::samples();
        let table = store.search(SearchKind::PatientMrn, "1010");

        assert_eq!(table.len(), 3);
        assert_eq!(table.columns[0], "Patient MRN");
        for row in 0..table.len() {
            assert_eq!(table.cell(row, "Patient MRN"), Some("101040"));
        }
        // heterogeneous entries leave gaps
        assert_eq!(table.cell(0, "physical_exam"), Some("Clear lung sounds, heart sounds normal."));
        assert_eq!(table.cell(1, "physical_exam"), None);
        assert_eq!(table.cell(1, "Diagnosis"), Some("Mild bronchitis"));
    }

    #[test]
    fn test_study_search_returns_summary_columns() {
        let store = RecordStore::samples();
        let table = store.search(SearchKind::StudyId, "10");

        assert_eq!(table.columns, vec!["Study ID", "Patient MRN", "Date", "Modality"]);
        assert_eq!(table.len(), 3);

        let single = store.search_by_label("Study ID", "102");
        assert_eq!(single.len(), 1);
        assert_eq!(single.cell(0, "Patient MRN"), Some("102040"));
    }

    #[test]
    fn test_no_match_and_unknown_kind_are_empty() {
        let store = RecordStore::samples();
        assert!(store.search(SearchKind::PatientMrn, "999999").is_empty());
        assert!(store.search_by_label("Accession", "101").is_empty());
        assert!(store.search_by_label("Accession", "101").columns.is_empty());
    }

    #[test]
    fn test_chart_markdown_is_newest_first() {
        let store = RecordStore::samples();
        let doc = store.chart_markdown(102).unwrap();

        let feb = doc.find("## 2024-02-10").unwrap();
        let jan = doc.find("## 2024-01-05").unwrap();
        let dec = doc.find("## 2023-12-20").unwrap();
        assert!(feb < jan && jan < dec);
        assert!(doc.contains("- **Diagnosis:** Early congestive heart failure"));
        assert!(!doc.contains("**Date:**"));
        assert!(store.chart_markdown(999).is_none());
    }

    #[test]
    fn test_chart_markdown_omits_blank_fields() {
        let store = RecordStore::new(vec![ClinicalRecord {
            study_id: 7,
            patient_mrn: "000007".into(),
            date: "2024-01-01".into(),
            modality: "Chest X-Ray".into(),
            charts: vec![
                ChartEntry::new(&[("Date", "2023-01-01"), ("Reason", "Old visit"), ("Plan", "  ")]),
                ChartEntry::new(&[("Date", "2024-05-01"), ("physical_exam", "Normal")]),
            ],
        }]);

        let doc = store.chart_markdown(7).unwrap();
        assert!(doc.find("2024-05-01").unwrap() < doc.find("2023-01-01").unwrap());
        assert!(doc.contains("- **Physical Exam:** Normal"));
        assert!(!doc.contains("Plan"));
    }
}
