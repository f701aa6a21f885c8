//! Translation between persisted rows and the domain `Tap`/`Formula` types.
//!
//! All knowledge of column encodings lives here, so a schema change only
//! touches this module and the migrations in `db`.

use std::path::PathBuf;

use tracing::warn;
use tw_core::{Formula, Tap, TestCommand, UploadType};

/// A row of the `taps` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRecord {
    pub id: i64,
    pub name: String,
    pub local_path: String,
    pub remote_path: Option<String>,
}

/// A row of the `formulas` table (schema v2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRecord {
    pub id: i64,
    pub tap_id: i64,
    pub name: String,
    pub details: String,
    pub homepage: String,
    pub license: String,
    pub local_project_path: String,
    pub upload_type: String,
    pub test_command_kind: Option<String>,
    pub test_command_value: Option<String>,
    pub extra_build_args: String,
}

pub const TEST_KIND_DEFAULT: &str = "default";
pub const TEST_KIND_CUSTOM: &str = "custom";

pub fn encode_upload_type(upload_type: UploadType) -> &'static str {
    upload_type.as_str()
}

/// Unknown values fall back to `binary` and are reported as a data-integrity warning.
pub fn decode_upload_type(raw: &str, formula: &str) -> UploadType {
    match raw {
        "binary" => UploadType::Binary,
        "tarball" => UploadType::Tarball,
        other => {
            warn!(
                formula,
                value = other,
                "unrecognized persisted upload type, treating as binary"
            );
            UploadType::Binary
        }
    }
}

pub fn encode_test_command(command: Option<&TestCommand>) -> (Option<&'static str>, Option<String>) {
    match command {
        None => (None, None),
        Some(TestCommand::DefaultCommand) => (Some(TEST_KIND_DEFAULT), None),
        Some(TestCommand::Custom(cmd)) => (Some(TEST_KIND_CUSTOM), Some(cmd.clone())),
    }
}

pub fn decode_test_command(kind: Option<&str>, value: Option<&str>, formula: &str) -> Option<TestCommand> {
    match (kind, value) {
        (None, _) => None,
        (Some(TEST_KIND_DEFAULT), _) => Some(TestCommand::DefaultCommand),
        (Some(TEST_KIND_CUSTOM), Some(cmd)) => Some(TestCommand::Custom(cmd.to_string())),
        (Some(TEST_KIND_CUSTOM), None) => {
            warn!(formula, "custom test command without a value, dropping it");
            None
        }
        (Some(other), _) => {
            warn!(formula, kind = other, "unrecognized persisted test command kind, dropping it");
            None
        }
    }
}

pub fn encode_build_args(args: &[String]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_build_args(raw: &str, formula: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(args) => args,
        Err(e) => {
            warn!(formula, error = %e, "unreadable persisted build arguments, ignoring them");
            Vec::new()
        }
    }
}

pub fn formula_from_record(record: &FormulaRecord, tap_name: &str) -> Formula {
    Formula {
        name: record.name.clone(),
        details: record.details.clone(),
        homepage: record.homepage.clone(),
        license: record.license.clone(),
        local_project_path: PathBuf::from(&record.local_project_path),
        upload_type: decode_upload_type(&record.upload_type, &record.name),
        test_command: decode_test_command(
            record.test_command_kind.as_deref(),
            record.test_command_value.as_deref(),
            &record.name,
        ),
        extra_build_args: decode_build_args(&record.extra_build_args, &record.name),
        tap: Some(tap_name.to_string()),
    }
}

/// Row values for a formula; `id` is left at 0 for inserts.
pub fn formula_to_record(formula: &Formula, tap_id: i64) -> FormulaRecord {
    let (kind, value) = encode_test_command(formula.test_command.as_ref());
    FormulaRecord {
        id: 0,
        tap_id,
        name: formula.name.clone(),
        details: formula.details.clone(),
        homepage: formula.homepage.clone(),
        license: formula.license.clone(),
        local_project_path: formula.local_project_path.to_string_lossy().to_string(),
        upload_type: encode_upload_type(formula.upload_type).to_string(),
        test_command_kind: kind.map(String::from),
        test_command_value: value,
        extra_build_args: encode_build_args(&formula.extra_build_args),
    }
}

pub fn tap_from_record(record: &TapRecord, formulas: &[FormulaRecord]) -> Tap {
    Tap {
        name: record.name.clone(),
        local_path: PathBuf::from(&record.local_path),
        remote_path: record.remote_path.clone().unwrap_or_default(),
        formulas: formulas
            .iter()
            .filter(|f| f.tap_id == record.id)
            .map(|f| formula_from_record(f, &record.name))
            .collect(),
    }
}

pub fn tap_to_record(tap: &Tap) -> TapRecord {
    TapRecord {
        id: 0,
        name: tap.name.clone(),
        local_path: tap.local_path.to_string_lossy().to_string(),
        remote_path: Some(tap.remote_path.trim().to_string()).filter(|r| !r.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_formula(test_command: Option<TestCommand>) -> Formula {
        Formula {
            name: "mytool".into(),
            details: "does things".into(),
            homepage: "https://example.com".into(),
            license: "MIT".into(),
            local_project_path: PathBuf::from("/src/mytool"),
            upload_type: UploadType::Tarball,
            test_command,
            extra_build_args: vec!["--features".into(), "full".into()],
            tap: Some("nntools".into()),
        }
    }

    #[test]
    fn formula_mapping_is_lossless_for_every_variant() {
        for test_command in [
            None,
            Some(TestCommand::DefaultCommand),
            Some(TestCommand::Custom("mytool --help".into())),
        ] {
            for upload_type in [UploadType::Binary, UploadType::Tarball] {
                let mut formula = sample_formula(test_command.clone());
                formula.upload_type = upload_type;

                let record = formula_to_record(&formula, 7);
                assert_eq!(record.tap_id, 7);
                assert_eq!(formula_from_record(&record, "nntools"), formula);
            }
        }
    }

    #[test]
    fn unknown_upload_type_fails_closed_to_binary() {
        assert_eq!(decode_upload_type("dmg", "mytool"), UploadType::Binary);
    }

    #[test]
    fn unknown_test_kind_is_dropped() {
        assert_eq!(decode_test_command(Some("script"), Some("x"), "mytool"), None);
        assert_eq!(decode_test_command(Some(TEST_KIND_CUSTOM), None, "mytool"), None);
    }

    #[test]
    fn corrupt_build_args_decode_empty() {
        assert!(decode_build_args("not json", "mytool").is_empty());
        assert_eq!(decode_build_args("[\"-v\"]", "mytool"), vec!["-v".to_string()]);
    }

    #[test]
    fn empty_remote_is_stored_as_null() {
        let tap = Tap::new("nntools", "/tmp/homebrew-nntools", "  ");
        let record = tap_to_record(&tap);
        assert_eq!(record.remote_path, None);
        assert_eq!(tap_from_record(&record, &[]).remote_path, "");
    }

    #[test]
    fn tap_mapping_only_takes_its_own_formulas() {
        let record = TapRecord {
            id: 1,
            name: "nntools".into(),
            local_path: "/tmp/homebrew-nntools".into(),
            remote_path: Some("https://github.com/nikolai/homebrew-nntools".into()),
        };
        let mine = formula_to_record(&sample_formula(None), 1);
        let mut other = formula_to_record(&sample_formula(None), 2);
        other.name = "foreign".into();

        let tap = tap_from_record(&record, &[mine, other]);
        assert_eq!(tap.formulas.len(), 1);
        assert_eq!(tap.formulas[0].tap.as_deref(), Some("nntools"));
    }
}
