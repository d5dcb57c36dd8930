//! End-to-end validation runs through the Gatekeeper
//!
//! Every package is built in memory and validated against the default preset
//! unless a test needs a different catalog.

use modelgate::config::catalog::RuleCatalog;
use modelgate::config::presets;
use modelgate::config::types::{Check, ErrorCode, Location, Severity};
use modelgate::testing::fixtures::{
    bytecode_metadata, bytecode_package, source_metadata, source_package,
    valid_bytecode_package, ClassFileBuilder, TarballBuilder, VALID_MODEL_SOURCE,
};
use modelgate::{Gatekeeper, RawPackage, Report, Status};

fn gate() -> Gatekeeper {
    Gatekeeper::new(presets::alphaback_v1().clone()).unwrap()
}

fn validate(key: &str, bytes: Vec<u8>) -> Report {
    gate().validate(&RawPackage::new(key, bytes))
}

fn codes(report: &Report) -> Vec<ErrorCode> {
    report.errors.iter().map(|e| e.code).collect()
}

/// `import os` on line 12, `eval(...)` on line 28
fn import_and_eval_source() -> String {
    let mut source = String::new();
    for n in 1..=11 {
        source.push_str(&format!("# header line {}\n", n));
    }
    source.push_str("import os\n"); // 12
    source.push_str("import numpy as np\n"); // 13
    source.push('\n'); // 14
    source.push_str("class TradingModel:\n"); // 15
    source.push_str("    def predict(self, stock_prices, volume, timestamps):\n"); // 16
    for n in 17..=27 {
        source.push_str(&format!("        step_{} = {}\n", n, n));
    }
    source.push_str("        signal = eval(\"'BUY'\")\n"); // 28
    source.push_str("        return {\"signal\": signal, \"confidence\": 0.5}\n");
    source
}

const EVERYTHING_WRONG_SOURCE: &str = r#"import os
import numpy as np
import socket


class TradingModel:
    def predict(self, stock_prices, volume, timestamps):
        weights = eval("[0.5, 0.5]")
        os.remove("/tmp/state")
        socket.create_connection(("example.com", 80))
        return {"signal": "HOLD", "confidence": 0.0}
"#;

#[test]
fn test_valid_source_package() {
    let report = validate(
        "uploads/momentum.tar.gz",
        source_package(VALID_MODEL_SOURCE, &source_metadata()).unwrap(),
    );

    assert_eq!(report.status, Status::Valid, "{:?}", report.errors);
    assert_eq!(report.checks_passed, Check::SEQUENCE.to_vec());
    assert!(report.errors.is_empty());
    assert_eq!(report.model_id, "momentum_v1");
}

#[test]
fn test_disallowed_import_and_builtin_are_located() {
    let report = validate(
        "uploads/momentum.tar.gz",
        source_package(&import_and_eval_source(), &source_metadata()).unwrap(),
    );

    assert_eq!(report.status, Status::Invalid);
    assert_eq!(report.checks_passed, Check::SEQUENCE[..4].to_vec());

    let import = report
        .errors
        .iter()
        .find(|e| e.code == ErrorCode::DisallowedImport)
        .expect("import violation");
    assert_eq!(import.location, Some(Location::Line(12)));
    assert!(import.message.contains("os"));

    let builtin = report
        .errors
        .iter()
        .find(|e| e.code == ErrorCode::DisallowedBuiltin)
        .expect("builtin violation");
    assert_eq!(builtin.location, Some(Location::Line(28)));
    assert!(builtin.message.contains("eval"));
}

#[test]
fn test_missing_version_fails_metadata_stage() {
    let mut metadata = source_metadata();
    metadata.as_object_mut().unwrap().remove("version");
    let report = validate(
        "uploads/momentum.tar.gz",
        source_package(VALID_MODEL_SOURCE, &metadata).unwrap(),
    );

    assert_eq!(report.status, Status::Invalid);
    assert_eq!(report.checks_passed, vec![Check::FileSize, Check::Structure]);
    assert_eq!(codes(&report), vec![ErrorCode::MissingMetadataFields]);
    assert!(report.errors[0].message.contains("version"));
    // Document still names the model
    assert_eq!(report.model_id, "momentum_v1");
}

#[test]
fn test_bytecode_references_one_error_per_class() {
    let class = ClassFileBuilder::model("com/example/Leaky")
        .class_ref("java/io/File")
        .class_ref("java/net/URL")
        .build();
    let bytes = bytecode_package(
        &bytecode_metadata("com.example.Leaky"),
        &[("com/example/Leaky.class", class)],
    )
    .unwrap();
    let report = validate("uploads/leaky.jar", bytes);

    assert_eq!(report.status, Status::Invalid);
    assert_eq!(report.checks_passed, Check::SEQUENCE[..4].to_vec());
    assert_eq!(
        codes(&report),
        vec![
            ErrorCode::DisallowedPackageReference,
            ErrorCode::DisallowedPackageReference
        ]
    );
    assert!(report.errors.iter().any(|e| e.message.contains("java/io/File")));
    assert!(report.errors.iter().any(|e| e.message.contains("java/net/URL")));
    for error in &report.errors {
        assert_eq!(
            error.location,
            Some(Location::Symbol("com/example/Leaky".to_string()))
        );
    }
}

#[test]
fn test_oversized_package_rejected_before_extraction() {
    let limit = presets::alphaback_v1().limits.max_package_bytes as usize;
    // Not an archive at all: reaching extraction would report a syntax error instead
    let report = validate("uploads/huge.tar.gz", vec![0u8; limit + 1]);

    assert_eq!(report.status, Status::Invalid);
    assert!(report.checks_passed.is_empty());
    assert_eq!(codes(&report), vec![ErrorCode::FileTooLarge]);
    assert_eq!(report.model_id, "uploads_huge");
}

#[test]
fn test_spent_budget_reports_timeout() {
    let mut catalog = RuleCatalog::default();
    catalog.limits.budget_ms = 0;
    let gate = Gatekeeper::permissive(catalog).unwrap();
    let package = RawPackage::new(
        "uploads/momentum.tar.gz",
        source_package(VALID_MODEL_SOURCE, &source_metadata()).unwrap(),
    );

    let report = gate.validate(&package);
    assert_eq!(report.status, Status::Invalid);
    assert_eq!(report.checks_passed, vec![Check::FileSize]);
    assert_eq!(codes(&report), vec![ErrorCode::ValidationTimeout]);
}

#[test]
fn test_scan_reports_every_violation_kind() {
    let report = validate(
        "uploads/bad.tar.gz",
        source_package(EVERYTHING_WRONG_SOURCE, &source_metadata()).unwrap(),
    );

    let found = codes(&report);
    for expected in [
        ErrorCode::DisallowedImport,
        ErrorCode::DisallowedBuiltin,
        ErrorCode::DisallowedFileOperation,
        ErrorCode::DisallowedNetworkOperation,
    ] {
        assert!(found.contains(&expected), "{:?} missing from {:?}", expected, found);
    }
    assert_eq!(report.errors.len(), 5);

    let lines: Vec<u32> = report
        .errors
        .iter()
        .map(|e| match e.location {
            Some(Location::Line(line)) => line,
            ref other => panic!("expected a line, got {:?}", other),
        })
        .collect();
    let mut sorted = lines.clone();
    sorted.sort_unstable();
    assert_eq!(lines, sorted, "violations must follow source order");
}

#[test]
fn test_same_bytes_same_verdict() {
    let gate = gate();
    let packages = [
        RawPackage::new(
            "a.tar.gz",
            source_package(EVERYTHING_WRONG_SOURCE, &source_metadata()).unwrap(),
        ),
        RawPackage::new("b.jar", valid_bytecode_package().unwrap()),
        RawPackage::new("c.tar.gz", b"garbage".to_vec()),
    ];

    for package in &packages {
        let first = gate.validate(package);
        let second = gate.validate(package);
        assert!(first.same_verdict(&second), "{:?} vs {:?}", first, second);
    }
}

#[test]
fn test_checks_passed_is_always_a_prefix() {
    let no_metadata = TarballBuilder::new()
        .file("model.py", VALID_MODEL_SOURCE.as_bytes())
        .build()
        .unwrap();

    let packages = vec![
        source_package(VALID_MODEL_SOURCE, &source_metadata()).unwrap(),
        source_package(&import_and_eval_source(), &source_metadata()).unwrap(),
        source_package("class TradingModel:\n    pass\n", &source_metadata()).unwrap(),
        source_package("def broken(:\n", &source_metadata()).unwrap(),
        source_package(VALID_MODEL_SOURCE, &serde_json::json!({"model_id": 7})).unwrap(),
        no_metadata,
        valid_bytecode_package().unwrap(),
        b"PK\x03\x04 truncated".to_vec(),
        Vec::new(),
    ];

    let gate = gate();
    for (n, bytes) in packages.into_iter().enumerate() {
        let report = gate.validate(&RawPackage::new(format!("p{}.bin", n), bytes));
        let passed = report.checks_passed.len();
        assert_eq!(
            report.checks_passed.as_slice(),
            &Check::SEQUENCE[..passed],
            "package {}",
            n
        );
        if passed < Check::SEQUENCE.len() {
            assert!(!report.errors.is_empty(), "package {} stopped without an error", n);
            assert_eq!(report.status, Status::Invalid);
        }
        if report.is_valid() {
            assert!(report.errors.is_empty());
        }
        for error in &report.errors {
            assert_eq!(error.severity, Severity::Critical);
        }
    }
}

#[test]
fn test_file_access_is_critical_in_both_formats() {
    let source = "import numpy as np\n\n\nclass TradingModel:\n    def predict(self, stock_prices, volume, timestamps):\n        handle = open(\"/etc/passwd\")\n        return {\"signal\": \"HOLD\", \"confidence\": 0.0}\n";
    let source_report = validate(
        "s.tar.gz",
        source_package(source, &source_metadata()).unwrap(),
    );

    let class = ClassFileBuilder::model("com/example/Reader")
        .method_ref("java/io/FileInputStream", "<init>", "(Ljava/lang/String;)V")
        .build();
    let bytecode_report = validate(
        "b.jar",
        bytecode_package(
            &bytecode_metadata("com.example.Reader"),
            &[("com/example/Reader.class", class)],
        )
        .unwrap(),
    );

    for (report, code) in [
        (&source_report, ErrorCode::DisallowedBuiltin),
        (&bytecode_report, ErrorCode::DisallowedPackageReference),
    ] {
        assert_eq!(report.status, Status::Invalid);
        assert_eq!(report.checks_passed, Check::SEQUENCE[..4].to_vec());
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        assert_eq!(report.errors[0].code, code);
        assert_eq!(report.errors[0].severity, Severity::Critical);
    }
}

#[test]
fn test_concurrent_runs_share_one_gatekeeper() {
    let gate = gate();
    let valid = RawPackage::new(
        "v.tar.gz",
        source_package(VALID_MODEL_SOURCE, &source_metadata()).unwrap(),
    );
    let invalid = RawPackage::new(
        "i.tar.gz",
        source_package(EVERYTHING_WRONG_SOURCE, &source_metadata()).unwrap(),
    );
    let expected_valid = gate.validate(&valid);
    let expected_invalid = gate.validate(&invalid);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let gate = &gate;
                let package = if n % 2 == 0 { &valid } else { &invalid };
                scope.spawn(move || gate.validate(package))
            })
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            let report = handle.join().unwrap();
            let expected = if n % 2 == 0 {
                &expected_valid
            } else {
                &expected_invalid
            };
            assert!(report.same_verdict(expected));
        }
    });
}

#[test]
fn test_report_wire_format() {
    let report = validate(
        "uploads/momentum.tar.gz",
        source_package(&import_and_eval_source(), &source_metadata()).unwrap(),
    );
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(value["model_id"], "momentum_v1");
    assert_eq!(value["status"], "INVALID");
    assert_eq!(
        value["checks_passed"],
        serde_json::json!(["file_size", "structure", "metadata", "signature"])
    );
    assert_eq!(value["errors"][0]["code"], "DISALLOWED_IMPORT");
    assert_eq!(value["errors"][0]["severity"], "CRITICAL");
    assert_eq!(value["errors"][0]["location"]["line"], 12);
    assert!(value["execution_time_ms"].is_u64());
}
