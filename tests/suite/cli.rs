//! The `provgate` binary, driven the way a pipeline would drive it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tempfile::{TempDir, tempdir};

use provgate_types::{AttributeBias, DatasetId};

use crate::common::{MODEL, clean_customers, compliant_metadata, raw_customers};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempdir().unwrap(),
        };
        fs::create_dir(ws.registry()).unwrap();
        fs::write(ws.file("raw.json"), raw_customers().to_string()).unwrap();
        fs::write(ws.file("clean.json"), clean_customers().to_string()).unwrap();
        ws
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn registry(&self) -> PathBuf {
        self.file("registry")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_provgate"))
            .arg("--db")
            .arg(self.file("governance.db"))
            .args(args)
            .env("PROVGATE_CONFIG", self.file("absent.toml"))
            .env("RUST_LOG", "warn")
            .output()
            .unwrap()
    }

    fn stdout(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn register(&self, dataset_id: &str, bias: f64) {
        let mut meta = compliant_metadata(&DatasetId::new(dataset_id).unwrap());
        let today = Utc::now();
        if let Some(risk) = meta.risk_assessment.as_mut() {
            risk.completed_at = today - TimeDelta::days(10);
        }
        if let Some(security) = meta.security_assessment.as_mut() {
            security.completed_at = today - TimeDelta::days(5);
        }
        meta.bias_assessment.insert(
            "age_group".into(),
            AttributeBias {
                demographic_parity_difference: Some(bias),
                disparate_impact: None,
            },
        );
        fs::write(
            self.registry().join(format!("{MODEL}.json")),
            serde_json::to_string_pretty(&meta).unwrap(),
        )
        .unwrap();
    }

    fn pipeline(&self) -> String {
        let raw = path_arg(&self.file("raw.json"));
        let clean = path_arg(&self.file("clean.json"));
        let dataset_id = self.stdout(&[
            "extract",
            "--source",
            "customer_db",
            "--query",
            "SELECT * FROM customers",
            "--data",
            &raw,
        ]);
        self.stdout(&[
            "transform",
            &dataset_id,
            "--step",
            "remove_nulls",
            "--input",
            &raw,
            "--output",
            &clean,
            "--code",
            "df.dropna()",
        ]);
        self.stdout(&["link", &dataset_id, MODEL, "--training-run", "run-7"]);
        dataset_id
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn pipeline_verifies_and_prints_chain() {
    let ws = Workspace::new();
    let dataset_id = ws.pipeline();
    assert!(dataset_id.starts_with("ds_"));

    let verification: Value = serde_json::from_str(&ws.stdout(&["verify", &dataset_id])).unwrap();
    assert_eq!(verification["record_count"], 3);
    assert_eq!(verification["linked_model"], MODEL);

    let chain: Value = serde_json::from_str(&ws.stdout(&["chain", &dataset_id])).unwrap();
    assert_eq!(chain.as_array().unwrap().len(), 3);

    let audit = ws.stdout(&["audit", "--subject", &dataset_id]);
    assert_eq!(audit.lines().count(), 3);
}

#[test]
fn validate_exit_status_reflects_decision() {
    let ws = Workspace::new();
    let dataset_id = ws.pipeline();
    let registry = path_arg(&ws.registry());
    let report_path = path_arg(&ws.file("report.json"));

    ws.register(&dataset_id, 0.12);
    let blocked = ws.run(&["validate", MODEL, "--risk", "high", "--registry", &registry]);
    assert_eq!(blocked.status.code(), Some(2));
    let report: Value = serde_json::from_slice(&blocked.stdout).unwrap();
    assert_eq!(report["can_deploy"], false);
    assert_eq!(report["failures"], serde_json::json!(["bias_threshold_check"]));

    ws.register(&dataset_id, 0.05);
    ws.stdout(&[
        "validate",
        MODEL,
        "--risk",
        "high",
        "--registry",
        &registry,
        "--report-out",
        &report_path,
    ]);
    let written: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written["can_deploy"], true);
}

#[test]
fn unknown_dataset_fails_cleanly() {
    let ws = Workspace::new();
    let output = ws.run(&["verify", "ds_missing"]);
    assert_eq!(output.status.code(), Some(1));

    let output = ws.run(&["link", "ds_missing", MODEL]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no lineage chain"));
}
